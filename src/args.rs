use std::path::PathBuf;

use clap::Parser;

use shortsmith::config::{Config, TtsBackend};

#[derive(Parser, Debug)]
#[clap(about = "Generate a narrated short video for a topic")]
pub struct Args {
    #[clap(long)]
    pub topic: String,

    #[clap(long, default_value = "shortsmith.toml")]
    pub config: PathBuf,

    /// Overrides `project.base_dir`.
    #[clap(long)]
    pub projects_dir: Option<PathBuf>,

    #[clap(long)]
    pub music_dir: Option<PathBuf>,

    #[clap(long, value_enum)]
    pub tts: Option<TtsBackend>,

    #[clap(long)]
    pub max_attempts: Option<u32>,

    #[clap(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Folds command-line overrides into the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.projects_dir {
            config.project.base_dir = dir.clone();
        }
        if let Some(dir) = &self.music_dir {
            config.video.music_dir = Some(dir.clone());
        }
        if let Some(backend) = self.tts {
            config.tts.backend = backend;
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_what_was_given() {
        let args = Args::parse_from([
            "shortsmith",
            "--topic",
            "Spiderman origin",
            "--tts",
            "elevenlabs",
            "--max-attempts",
            "2",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.tts.backend, TtsBackend::Elevenlabs);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.project.base_dir, PathBuf::from("projects"));
        assert_eq!(args.config, PathBuf::from("shortsmith.toml"));
    }
}
