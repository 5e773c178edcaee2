use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::config::RetryConfig;

/// Upper bound for any single wait, in seconds (one day).
const MAX_WAIT_SECS: f64 = 86_400.0;

fn finite_secs(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, MAX_WAIT_SECS) }
}

/// Bounded exponential backoff with uniform jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub max_delay: f64,
    pub jitter: f64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            backoff_factor: finite_secs(cfg.backoff_factor),
            max_delay: finite_secs(cfg.max_delay),
            jitter: finite_secs(cfg.jitter),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the `failed`-th failure (0-based), without jitter.
    pub fn base_delay(&self, failed: u32) -> f64 {
        let doubled = self.backoff_factor * 2f64.powi(failed.min(62) as i32);
        finite_secs(doubled.min(self.max_delay))
    }

    /// Total wait including jitter, never above one day.
    pub fn delay_with<R: Rng>(&self, failed: u32, rng: &mut R) -> Duration {
        let spread = finite_secs(self.jitter);
        let jitter = if spread > 0.0 {
            rng.gen_range(0.0..spread)
        } else {
            0.0
        };
        Duration::from_secs_f64(finite_secs(self.base_delay(failed) + jitter))
    }

    fn delay(&self, failed: u32) -> Duration {
        self.delay_with(failed, &mut rand::thread_rng())
    }

    /// Runs `op` until it succeeds or attempts run out; the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= attempts => {
                    error!("Max retries reached ({} attempts): {}", attempts, e);
                    return Err(e);
                }
                Err(e) => {
                    let wait = self.delay(attempt);
                    warn!(
                        "Error: {}. Retrying in {:.2} seconds... (Attempt {} of {})",
                        e,
                        wait.as_secs_f64(),
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_factor: 1.0,
            max_delay: 6.0,
            jitter: 1.0,
        }
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        let p = policy();
        assert_eq!(p.base_delay(0), 1.0);
        assert_eq!(p.base_delay(1), 2.0);
        assert_eq!(p.base_delay(2), 4.0);
        assert_eq!(p.base_delay(3), 6.0);
        assert_eq!(p.base_delay(40), 6.0);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let p = policy();
        let mut rng = StdRng::seed_from_u64(1);
        for failed in 0..5 {
            let d = p.delay_with(failed, &mut rng).as_secs_f64();
            let base = p.base_delay(failed);
            assert!(d >= base && d < base + 1.0);
        }
    }

    #[test]
    fn oversized_config_values_are_capped() {
        let cfg = RetryConfig {
            max_attempts: 2,
            backoff_factor: 1.0,
            max_delay: 1e20,
            jitter: f64::INFINITY,
        };
        let p = RetryPolicy::from(&cfg);
        assert!(p.max_delay.is_finite() && p.jitter.is_finite());

        let mut rng = StdRng::seed_from_u64(7);
        let wait = p.delay_with(200, &mut rng);
        assert!(wait <= Duration::from_secs_f64(MAX_WAIT_SECS));

        // Values set directly on the policy are capped too.
        let raw = RetryPolicy {
            max_attempts: 2,
            backoff_factor: 1e300,
            max_delay: f64::INFINITY,
            jitter: f64::INFINITY,
        };
        assert!(raw.delay_with(10, &mut rng) <= Duration::from_secs_f64(MAX_WAIT_SECS));
    }

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_factor: 0.0,
            max_delay: 0.0,
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result: Result<u32, String> = instant()
            .run(|attempt| {
                calls += 1;
                async move {
                    if attempt < 2 { Err(format!("fail {}", attempt)) } else { Ok(attempt) }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn surfaces_last_error_when_exhausted() {
        let result: Result<(), String> = instant()
            .run(|attempt| async move { Err(format!("fail {}", attempt)) })
            .await;
        assert_eq!(result, Err("fail 2".to_string()));
    }
}
