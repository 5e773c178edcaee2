use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ProjectError;
use crate::project::{
    FileCategory, ProjectManager, STATE_FILE_NAME, VIDEO_INFO_FILE_NAME, find_existing_project,
    has_final_video,
};
use crate::scene::{Scene, SceneDraft, VideoInfo, VideoMetadata};
use crate::utils::{append_json_record, read_json, write_json_atomic};

/// Pipeline progress, in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Initialized,
    StorylineGenerated,
    MetadataGenerated,
    ScenesGenerated,
    PromptsGenerated,
    ScenesProcessing,
    VideoCreated,
    Complete,
}

/// The persisted progress document for one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub storyline: String,
    #[serde(default)]
    pub video_metadata: Option<VideoMetadata>,
    #[serde(default)]
    pub scenes: Vec<SceneDraft>,
    #[serde(default)]
    pub image_prompts: Vec<String>,
    #[serde(default)]
    pub processed_scenes: Vec<Scene>,
    pub status: ProjectStatus,
    pub last_updated: DateTime<Local>,
}

impl Checkpoint {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            storyline: String::new(),
            video_metadata: None,
            scenes: Vec::new(),
            image_prompts: Vec::new(),
            processed_scenes: Vec::new(),
            status: ProjectStatus::Initialized,
            last_updated: Local::now(),
        }
    }
}

/// Sole reader and writer of `metadata/project_state.json`.
#[derive(Debug)]
pub struct StateManager {
    path: PathBuf,
    checkpoint: Checkpoint,
}

impl StateManager {
    /// Loads the workspace's checkpoint, creating an initialized one if absent.
    pub fn open(project: &ProjectManager, topic: &str) -> Result<Self, ProjectError> {
        let path = project.resolve_path(FileCategory::Metadata, STATE_FILE_NAME)?;
        if path.exists() {
            let checkpoint: Checkpoint = read_json(&path)?;
            info!("Loaded existing state file from {}", path.display());
            return Ok(Self { path, checkpoint });
        }
        let mut manager = Self {
            path,
            checkpoint: Checkpoint::new(topic),
        };
        manager.save()?;
        info!("Initialized new state file at {}", manager.path.display());
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Re-reads the document from disk.
    pub fn load(&mut self) -> Result<&Checkpoint, ProjectError> {
        self.checkpoint = read_json(&self.path)?;
        Ok(&self.checkpoint)
    }

    /// Applies `change` to a copy, stamps it and persists it. Memory is only
    /// updated once the write has landed.
    pub fn update<F>(&mut self, change: F) -> Result<(), ProjectError>
    where
        F: FnOnce(&mut Checkpoint),
    {
        let mut next = self.checkpoint.clone();
        change(&mut next);
        next.last_updated = Local::now();
        write_json_atomic(&self.path, &next)?;
        self.checkpoint = next;
        Ok(())
    }

    fn save(&mut self) -> Result<(), ProjectError> {
        self.update(|_| {})
    }

    pub fn is_complete(&self) -> bool {
        self.checkpoint.status == ProjectStatus::Complete
    }

    pub fn mark_complete(&mut self) -> Result<(), ProjectError> {
        self.update(|c| c.status = ProjectStatus::Complete)
    }
}

pub fn video_info_path(project: &ProjectManager) -> Result<PathBuf, ProjectError> {
    project.resolve_path(FileCategory::Metadata, VIDEO_INFO_FILE_NAME)
}

/// Appends to the workspace's record list; earlier records are never touched.
pub fn append_video_info(project: &ProjectManager, record: &VideoInfo) -> Result<usize, ProjectError> {
    let path = video_info_path(project)?;
    let count = append_json_record(&path, record)?;
    info!("Video info saved to {} ({} records)", path.display(), count);
    Ok(count)
}

/// Most recent record from a workspace's store, if any.
pub fn load_latest_video_info(workspace: &Path) -> Result<Option<VideoInfo>, ProjectError> {
    let path = workspace
        .join(FileCategory::Metadata.dir_name())
        .join(VIDEO_INFO_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let mut records: Vec<VideoInfo> = read_json(&path)?;
    Ok(records.pop())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeKind {
    Fresh,
    Resumed,
    Complete { video_info: Option<VideoInfo> },
}

/// An active workspace together with its checkpoint.
#[derive(Debug)]
pub struct ProjectSession {
    pub project: ProjectManager,
    pub state: StateManager,
    pub kind: ResumeKind,
}

fn start_fresh(mut project: ProjectManager, topic: &str) -> Result<ProjectSession, ProjectError> {
    project.create_workspace(topic)?;
    let mut state = StateManager::open(&project, topic)?;
    state.update(|c| {
        c.topic = topic.to_string();
        c.status = ProjectStatus::Initialized;
    })?;
    Ok(ProjectSession {
        project,
        state,
        kind: ResumeKind::Fresh,
    })
}

/// Decides whether a topic starts fresh, resumes, or is already finished.
pub fn resume_or_create(base_dir: &Path, topic: &str) -> Result<ProjectSession, ProjectError> {
    let mut project = ProjectManager::new(base_dir);

    let Some(existing) = find_existing_project(base_dir, topic)? else {
        info!("No existing project found for topic '{}'. Creating new project.", topic);
        return start_fresh(project, topic);
    };

    info!("Found existing project at {}", existing.display());
    project.activate(existing.clone());

    if has_final_video(&existing) {
        info!("Found existing final video in {}", existing.display());
        let mut state = StateManager::open(&project, topic)?;
        if !state.is_complete() {
            state.mark_complete()?;
        }
        let video_info = match load_latest_video_info(&existing) {
            Ok(info) => info,
            Err(e) => {
                warn!("Could not load video metadata: {}", e);
                None
            }
        };
        return Ok(ProjectSession {
            project,
            state,
            kind: ResumeKind::Complete { video_info },
        });
    }

    let state = StateManager::open(&project, topic)?;
    if state.is_complete() {
        warn!("Project marked complete but video not found. Creating new project instead.");
        return start_fresh(ProjectManager::new(base_dir), topic);
    }

    info!("Resuming project from state: {:?}", state.checkpoint().status);
    Ok(ProjectSession {
        project,
        state,
        kind: ResumeKind::Resumed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::FINAL_VIDEO_NAME;
    use std::fs;

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            title: "Title".into(),
            description: "Desc".into(),
            keywords: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn fresh_topic_creates_initialized_checkpoint() {
        let base = tempfile::tempdir().unwrap();
        let session = resume_or_create(base.path(), "Spiderman origin").unwrap();
        assert_eq!(session.kind, ResumeKind::Fresh);
        assert_eq!(session.state.checkpoint().status, ProjectStatus::Initialized);
        assert_eq!(session.state.checkpoint().topic, "Spiderman origin");
        assert!(session.state.path().exists());
    }

    #[test]
    fn incomplete_project_is_resumed() {
        let base = tempfile::tempdir().unwrap();
        let mut first = resume_or_create(base.path(), "topic").unwrap();
        first
            .state
            .update(|c| {
                c.storyline = "story".into();
                c.status = ProjectStatus::StorylineGenerated;
            })
            .unwrap();

        let second = resume_or_create(base.path(), "topic").unwrap();
        assert_eq!(second.kind, ResumeKind::Resumed);
        assert_eq!(second.project.current_dir(), first.project.current_dir());
        assert_eq!(second.state.checkpoint().storyline, "story");
    }

    #[test]
    fn non_ascii_and_symbol_topics_resume_their_workspace() {
        let base = tempfile::tempdir().unwrap();
        for topic in ["東京の歴史", "!!!"] {
            let first = resume_or_create(base.path(), topic).unwrap();
            assert_eq!(first.kind, ResumeKind::Fresh);

            let second = resume_or_create(base.path(), topic).unwrap();
            assert_eq!(second.kind, ResumeKind::Resumed, "topic {}", topic);
            assert_eq!(second.project.current_dir(), first.project.current_dir());
        }
    }

    #[test]
    fn stale_completion_starts_new_workspace() {
        let base = tempfile::tempdir().unwrap();
        let mut first = resume_or_create(base.path(), "topic").unwrap();
        first.state.mark_complete().unwrap();

        let second = resume_or_create(base.path(), "topic").unwrap();
        assert_eq!(second.kind, ResumeKind::Fresh);
        assert_ne!(second.project.current_dir(), first.project.current_dir());
        assert_eq!(second.state.checkpoint().status, ProjectStatus::Initialized);

        // The fresh workspace is the one picked up next time.
        let third = resume_or_create(base.path(), "topic").unwrap();
        assert_eq!(third.kind, ResumeKind::Resumed);
        assert_eq!(third.project.current_dir(), second.project.current_dir());
    }

    #[test]
    fn final_video_repairs_status_and_returns_record() {
        let base = tempfile::tempdir().unwrap();
        let first = resume_or_create(base.path(), "topic").unwrap();
        let video = first.project.final_video_path().unwrap();
        fs::write(&video, b"mp4").unwrap();
        let record = VideoInfo::new(video.clone(), &metadata());
        append_video_info(&first.project, &record).unwrap();

        let second = resume_or_create(base.path(), "topic").unwrap();
        assert_eq!(
            second.kind,
            ResumeKind::Complete {
                video_info: Some(record)
            }
        );
        assert!(second.state.is_complete());
    }

    #[test]
    fn completeness_survives_corrupt_video_info() {
        let base = tempfile::tempdir().unwrap();
        let first = resume_or_create(base.path(), "topic").unwrap();
        let dir = first.project.current_dir().unwrap().to_path_buf();
        fs::write(dir.join("video").join(FINAL_VIDEO_NAME), b"mp4").unwrap();
        fs::write(video_info_path(&first.project).unwrap(), b"{not json").unwrap();

        let second = resume_or_create(base.path(), "topic").unwrap();
        assert_eq!(second.kind, ResumeKind::Complete { video_info: None });
    }

    #[test]
    fn update_bumps_timestamp_and_persists() {
        let base = tempfile::tempdir().unwrap();
        let mut session = resume_or_create(base.path(), "topic").unwrap();
        let before = session.state.checkpoint().last_updated;
        session
            .state
            .update(|c| c.image_prompts = vec!["p".into()])
            .unwrap();
        assert!(session.state.checkpoint().last_updated >= before);

        let on_disk: Checkpoint = read_json(session.state.path()).unwrap();
        assert_eq!(on_disk, *session.state.checkpoint());
    }

    #[test]
    fn append_only_store_grows_by_one() {
        let base = tempfile::tempdir().unwrap();
        let session = resume_or_create(base.path(), "topic").unwrap();
        let a = VideoInfo::new("a.mp4".into(), &metadata());
        let b = VideoInfo::new("b.mp4".into(), &metadata());
        assert_eq!(append_video_info(&session.project, &a).unwrap(), 1);
        assert_eq!(append_video_info(&session.project, &b).unwrap(), 2);

        let all: Vec<VideoInfo> = read_json(&video_info_path(&session.project).unwrap()).unwrap();
        assert_eq!(all, vec![a, b.clone()]);
        let dir = session.project.current_dir().unwrap();
        assert_eq!(load_latest_video_info(dir).unwrap(), Some(b));
    }

    #[test]
    fn status_order_follows_stages() {
        assert!(ProjectStatus::Initialized < ProjectStatus::StorylineGenerated);
        assert!(ProjectStatus::ScenesProcessing < ProjectStatus::VideoCreated);
        let json = serde_json::to_string(&ProjectStatus::PromptsGenerated).unwrap();
        assert_eq!(json, "\"prompts_generated\"");
    }
}
