use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SceneError;

pub const DEFAULT_TRANSITION_SECS: f64 = 1.0;

/// Tolerance for comparing accumulated start times.
const TIMING_EPSILON: f64 = 1e-6;

fn default_transition() -> f64 {
    DEFAULT_TRANSITION_SECS
}

/// One narrated visual beat of the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub description: String,
    pub image_path: PathBuf,
    pub narration: String,
    pub audio_path: PathBuf,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default = "default_transition")]
    pub transition_duration: f64,
}

impl Scene {
    pub fn new(
        description: String,
        image_path: PathBuf,
        narration: String,
        audio_path: PathBuf,
        start_time: f64,
        duration: f64,
    ) -> Result<Self, SceneError> {
        if narration.split_whitespace().next().is_none() {
            return Err(SceneError::EmptyNarration);
        }
        if !(duration > 0.0) || !duration.is_finite() {
            return Err(SceneError::NonPositiveDuration(duration));
        }
        Ok(Self {
            description,
            image_path,
            narration,
            audio_path,
            start_time,
            duration,
            transition_duration: DEFAULT_TRANSITION_SECS,
        })
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn words(&self) -> Vec<&str> {
        self.narration.split_whitespace().collect()
    }
}

/// Checks that scenes start at zero and each one begins where the previous ended.
pub fn validate_timeline(scenes: &[Scene]) -> Result<(), SceneError> {
    let mut expected = 0.0_f64;
    for (index, scene) in scenes.iter().enumerate() {
        if !(scene.duration > 0.0) {
            return Err(SceneError::NonPositiveDuration(scene.duration));
        }
        if scene.narration.trim().is_empty() {
            return Err(SceneError::EmptyNarration);
        }
        if (scene.start_time - expected).abs() > TIMING_EPSILON {
            return Err(SceneError::Discontinuous {
                index,
                expected,
                actual: scene.start_time,
            });
        }
        expected = scene.end_time();
    }
    Ok(())
}

/// Where the next scene should start, given the ones already placed.
pub fn next_start_time(scenes: &[Scene]) -> f64 {
    scenes.last().map(Scene::end_time).unwrap_or(0.0)
}

/// Scene description and narration as produced by the script stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDraft {
    pub scene: String,
    pub narration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl VideoMetadata {
    /// Limits a record must meet before it is kept: a non-empty title under
    /// 100 chars and 5-10 non-blank keywords.
    pub fn hard_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        let title_len = self.title.trim().chars().count();
        if title_len == 0 {
            out.push("title is empty".to_string());
        } else if title_len >= 100 {
            out.push(format!("title is {} chars (limit 99)", title_len));
        }
        if !(5..=10).contains(&self.keywords.len()) {
            out.push(format!("{} keywords (want 5-10)", self.keywords.len()));
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            out.push("blank keyword".to_string());
        }
        out
    }

    /// Every limit the record breaks, including the advisory description length.
    pub fn violations(&self) -> Vec<String> {
        let mut out = self.hard_violations();
        let desc_len = self.description.chars().count();
        if !(100..=500).contains(&desc_len) {
            out.push(format!("description is {} chars (want 100-500)", desc_len));
        }
        out
    }
}

fn default_category() -> String {
    "22".to_string()
}

fn default_privacy() -> String {
    "private".to_string()
}

/// Record of one completed pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub file_path: PathBuf,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_privacy")]
    pub privacy_status: String,
}

impl VideoInfo {
    pub fn new(file_path: PathBuf, metadata: &VideoMetadata) -> Self {
        Self {
            file_path,
            title: metadata.title.clone(),
            description: metadata.description.clone(),
            keywords: metadata.keywords.clone(),
            category: default_category(),
            privacy_status: default_privacy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(start: f64, duration: f64) -> Scene {
        Scene::new(
            "desc".into(),
            "img.jpg".into(),
            "hello world".into(),
            "a.wav".into(),
            start,
            duration,
        )
        .unwrap()
    }

    #[test]
    fn constructor_rejects_empty_narration() {
        let err = Scene::new("d".into(), "i".into(), "   ".into(), "a".into(), 0.0, 1.0);
        assert!(matches!(err, Err(SceneError::EmptyNarration)));
    }

    #[test]
    fn constructor_rejects_zero_duration() {
        let err = Scene::new("d".into(), "i".into(), "hi".into(), "a".into(), 0.0, 0.0);
        assert!(matches!(err, Err(SceneError::NonPositiveDuration(_))));
    }

    #[test]
    fn contiguous_timeline_is_valid() {
        let scenes = vec![scene(0.0, 2.5), scene(2.5, 3.0), scene(5.5, 1.25)];
        assert!(validate_timeline(&scenes).is_ok());
        assert_eq!(next_start_time(&scenes), 6.75);
    }

    #[test]
    fn gap_in_timeline_is_reported() {
        let scenes = vec![scene(0.0, 2.0), scene(2.5, 1.0)];
        match validate_timeline(&scenes) {
            Err(SceneError::Discontinuous { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn first_scene_must_start_at_zero() {
        assert!(validate_timeline(&[scene(1.0, 2.0)]).is_err());
    }

    #[test]
    fn transition_defaults_when_missing_from_json() {
        let json = r#"{"description":"d","image_path":"i","narration":"n","audio_path":"a","start_time":0.0,"duration":2.0}"#;
        let s: Scene = serde_json::from_str(json).unwrap();
        assert_eq!(s.transition_duration, 1.0);
    }

    fn keywords(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("k{}", i)).collect()
    }

    #[test]
    fn metadata_violations_are_listed() {
        let meta = VideoMetadata {
            title: "t".repeat(120),
            description: "short".into(),
            keywords: vec!["a".into()],
        };
        assert_eq!(meta.violations().len(), 3);
        assert_eq!(meta.hard_violations().len(), 2);
    }

    #[test]
    fn short_description_is_only_advisory() {
        let meta = VideoMetadata {
            title: "Spider bite".into(),
            description: "short".into(),
            keywords: keywords(5),
        };
        assert!(meta.hard_violations().is_empty());
        assert_eq!(meta.violations().len(), 1);
    }

    #[test]
    fn keyword_count_and_title_are_enforced() {
        let base = VideoMetadata {
            title: "Spider bite".into(),
            description: "d".repeat(150),
            keywords: keywords(10),
        };
        assert!(base.violations().is_empty());

        let too_many = VideoMetadata { keywords: keywords(11), ..base.clone() };
        assert_eq!(too_many.hard_violations().len(), 1);
        let blank_title = VideoMetadata { title: "  ".into(), ..base.clone() };
        assert_eq!(blank_title.hard_violations(), vec!["title is empty".to_string()]);
        let long_title = VideoMetadata { title: "x".repeat(100), ..base };
        assert_eq!(long_title.hard_violations().len(), 1);
    }

    #[test]
    fn video_info_carries_default_upload_fields() {
        let meta = VideoMetadata {
            title: "Title".into(),
            description: "d".into(),
            keywords: vec!["k".into()],
        };
        let info = VideoInfo::new("out.mp4".into(), &meta);
        assert_eq!(info.category, "22");
        assert_eq!(info.privacy_status, "private");
    }
}
