use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::{debug, info};

use crate::error::ProjectError;
use crate::utils::normalize_topic;

pub const FINAL_VIDEO_NAME: &str = "final_video.mp4";
/// Render target; only renamed to `FINAL_VIDEO_NAME` once the encoder succeeded.
pub const PARTIAL_VIDEO_NAME: &str = "final_video.partial.mp4";
pub const STATE_FILE_NAME: &str = "project_state.json";
pub const VIDEO_INFO_FILE_NAME: &str = "video_info.json";

static TIMESTAMPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}_\d{6}_(.+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Image,
    Audio,
    Video,
    Metadata,
}

impl FileCategory {
    pub const ALL: [FileCategory; 4] = [
        FileCategory::Image,
        FileCategory::Audio,
        FileCategory::Video,
        FileCategory::Metadata,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            FileCategory::Image => "images",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Metadata => "metadata",
        }
    }
}

impl FromStr for FileCategory {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(FileCategory::Image),
            "audio" => Ok(FileCategory::Audio),
            "video" => Ok(FileCategory::Video),
            "metadata" => Ok(FileCategory::Metadata),
            other => Err(ProjectError::InvalidCategory(other.to_string())),
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Owns the projects root and the currently active workspace directory.
#[derive(Debug, Clone)]
pub struct ProjectManager {
    base_dir: PathBuf,
    current: Option<PathBuf>,
}

impl ProjectManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            current: None,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn activate(&mut self, dir: PathBuf) {
        self.current = Some(dir);
    }

    /// Creates `<base>/<timestamp>_<key>` with the four category folders and activates it.
    pub fn create_workspace(&mut self, topic: &str) -> Result<PathBuf, ProjectError> {
        let key = normalize_topic(topic);
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut dir = self.base_dir.join(format!("{}_{}", stamp, key));
        // Two creations within one second would collide.
        let mut suffix = 1;
        while dir.exists() {
            let bumped = Local::now() + chrono::Duration::seconds(suffix);
            dir = self
                .base_dir
                .join(format!("{}_{}", bumped.format("%Y%m%d_%H%M%S"), key));
            suffix += 1;
        }

        for category in FileCategory::ALL {
            let sub = dir.join(category.dir_name());
            fs::create_dir_all(&sub).map_err(|e| ProjectError::io(&sub, e))?;
        }
        info!("Created project directory: {}", dir.display());
        self.current = Some(dir.clone());
        Ok(dir)
    }

    /// Finds a workspace for `topic`, or creates a fresh one when none exists.
    pub fn create_or_locate(&mut self, topic: &str) -> Result<PathBuf, ProjectError> {
        match find_existing_project(&self.base_dir, topic)? {
            Some(dir) => {
                info!("Reusing project directory: {}", dir.display());
                self.current = Some(dir.clone());
                Ok(dir)
            }
            None => self.create_workspace(topic),
        }
    }

    pub fn resolve_path(&self, category: FileCategory, filename: &str) -> Result<PathBuf, ProjectError> {
        let dir = self.current.as_ref().ok_or(ProjectError::NoWorkspace)?;
        Ok(dir.join(category.dir_name()).join(filename))
    }

    /// String-keyed variant for callers holding an untyped category name.
    pub fn resolve_named(&self, category: &str, filename: &str) -> Result<PathBuf, ProjectError> {
        let category = category.parse::<FileCategory>()?;
        self.resolve_path(category, filename)
    }

    pub fn final_video_path(&self) -> Result<PathBuf, ProjectError> {
        self.resolve_path(FileCategory::Video, FINAL_VIDEO_NAME)
    }

    pub fn partial_video_path(&self) -> Result<PathBuf, ProjectError> {
        self.resolve_path(FileCategory::Video, PARTIAL_VIDEO_NAME)
    }
}

pub fn has_final_video(dir: &Path) -> bool {
    dir.join(FileCategory::Video.dir_name())
        .join(FINAL_VIDEO_NAME)
        .is_file()
}

/// Looks up `<key>` or any `YYYYMMDD_HHMMSS_<key>` under `base_dir`.
///
/// A candidate that already holds a final video wins; otherwise the newest
/// timestamped name wins, with the untimestamped directory ranked oldest.
pub fn find_existing_project(base_dir: &Path, topic: &str) -> Result<Option<PathBuf>, ProjectError> {
    if !base_dir.is_dir() {
        return Ok(None);
    }
    let key = normalize_topic(topic);

    let mut candidates = Vec::new();
    let entries = fs::read_dir(base_dir).map_err(|e| ProjectError::io(base_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ProjectError::io(base_dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let matches = name == key
            || TIMESTAMPED
                .captures(name)
                .and_then(|c| c.get(1))
                .is_some_and(|m| normalize_topic(m.as_str()) == key);
        if matches {
            debug!("Candidate project for '{}': {}", topic, path.display());
            candidates.push(path);
        }
    }

    // Exact name sorts as oldest; timestamped names sort by time.
    candidates.sort_by_key(|p| {
        let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        (name != key, name.to_string())
    });

    let complete = candidates.iter().rev().find(|p| has_final_video(p)).cloned();
    Ok(complete.or_else(|| candidates.pop()))
}
