use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audio::audio_duration;
use crate::error::{PipelineError, ProjectError, Result};
use crate::image_gen::ImageGenerator;
use crate::llm::{Schema, StructuredGenerator};
use crate::project::{FileCategory, ProjectManager};
use crate::prompts;
use crate::research::Researcher;
use crate::retry::RetryPolicy;
use crate::scene::{Scene, SceneDraft, VideoInfo, VideoMetadata, next_start_time, validate_timeline};
use crate::state::{
    ProjectSession, ProjectStatus, ResumeKind, StateManager, append_video_info, resume_or_create,
};
use crate::tts::SpeechGenerator;
use crate::video::VideoAssembler;

/// The external services a run depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub researcher: Arc<dyn Researcher>,
    pub structured: Arc<dyn StructuredGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechGenerator>,
}

pub fn image_file_name(index: usize) -> String {
    format!("scene_{}.jpg", index)
}

pub fn audio_file_name(index: usize, extension: &str) -> String {
    format!("narration_{}.{}", index, extension)
}

/// Drives the stage sequence for one topic, skipping whatever the checkpoint
/// already holds.
pub struct Pipeline {
    base_dir: PathBuf,
    retry: RetryPolicy,
    transition_duration: f64,
    collab: Collaborators,
    assembler: Arc<dyn VideoAssembler>,
}

impl Pipeline {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
        collab: Collaborators,
        assembler: Arc<dyn VideoAssembler>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            retry,
            transition_duration: crate::scene::DEFAULT_TRANSITION_SECS,
            collab,
            assembler,
        }
    }

    pub fn with_transition_duration(mut self, seconds: f64) -> Self {
        self.transition_duration = seconds;
        self
    }

    /// Runs the whole pipeline under the retry policy. Each retry resumes from
    /// the last checkpoint.
    pub async fn run_with_retry(&self, topic: &str) -> Result<VideoInfo> {
        self.retry
            .run(|attempt| async move {
                info!("Pipeline attempt {} for '{}'", attempt + 1, topic);
                self.run_once(topic).await
            })
            .await
    }

    pub async fn run_once(&self, topic: &str) -> Result<VideoInfo> {
        let ProjectSession {
            project,
            mut state,
            kind,
        } = resume_or_create(&self.base_dir, topic)?;

        if let ResumeKind::Complete { video_info } = kind {
            info!("Project for '{}' is already complete", topic);
            return self.completed_info(&project, &state, topic, video_info);
        }

        let storyline = self.storyline_stage(&mut state, topic).await?;
        let metadata = self.metadata_stage(&mut state, &storyline, topic).await?;
        let drafts = self.scenes_stage(&mut state, &storyline, topic).await?;
        let prompts = self.prompts_stage(&mut state, &drafts).await?;
        let scenes = self.media_stage(&project, &mut state, &drafts, &prompts).await?;
        let output = self.assembly_stage(&project, &mut state, scenes).await?;

        let video_info = VideoInfo::new(output, &metadata);
        info!("Video created: {}", video_info.file_path.display());
        info!("Video Title: {}", video_info.title);
        info!("Video Keywords: {}", video_info.keywords.join(", "));
        append_video_info(&project, &video_info)?;
        state.mark_complete()?;
        Ok(video_info)
    }

    fn completed_info(
        &self,
        project: &ProjectManager,
        state: &StateManager,
        topic: &str,
        loaded: Option<VideoInfo>,
    ) -> Result<VideoInfo> {
        if let Some(info) = loaded {
            return Ok(info);
        }
        let path = project.final_video_path()?;
        let metadata = state.checkpoint().video_metadata.clone().unwrap_or_else(|| {
            warn!("No stored metadata for completed project; using topic as title");
            VideoMetadata {
                title: topic.to_string(),
                description: String::new(),
                keywords: Vec::new(),
            }
        });
        let info = VideoInfo::new(path, &metadata);
        if let Err(e) = append_video_info(project, &info) {
            warn!("Could not record video info for completed project: {}", e);
        }
        Ok(info)
    }

    async fn storyline_stage(&self, state: &mut StateManager, topic: &str) -> Result<String> {
        let existing = &state.checkpoint().storyline;
        if !existing.trim().is_empty() {
            info!("Using storyline from checkpoint");
            return Ok(existing.clone());
        }
        info!("Generating storyline for '{}'", topic);
        let storyline = self.collab.researcher.research(topic).await.inspect_err(|e| {
            error!("Research stage failed: {}", e);
        })?;
        state.update(|c| {
            c.storyline = storyline.clone();
            c.status = ProjectStatus::StorylineGenerated;
        })?;
        Ok(storyline)
    }

    async fn metadata_stage(
        &self,
        state: &mut StateManager,
        storyline: &str,
        topic: &str,
    ) -> Result<VideoMetadata> {
        if let Some(meta) = &state.checkpoint().video_metadata {
            info!("Using video metadata from checkpoint");
            return Ok(meta.clone());
        }
        info!("Generating video metadata");
        let meta = self
            .collab
            .structured
            .generate(&prompts::metadata_prompt(storyline, topic), Schema::Metadata)
            .await
            .and_then(|out| out.into_metadata())
            .inspect_err(|e| error!("Metadata stage failed: {}", e))?;

        let rejected = meta.hard_violations();
        if !rejected.is_empty() {
            return Err(PipelineError::Metadata(rejected.join("; ")));
        }
        for issue in meta.violations() {
            warn!("Video metadata: {}", issue);
        }
        info!("Title: {}", meta.title);

        state.update(|c| {
            c.video_metadata = Some(meta.clone());
            c.status = ProjectStatus::MetadataGenerated;
        })?;
        Ok(meta)
    }

    async fn scenes_stage(
        &self,
        state: &mut StateManager,
        storyline: &str,
        topic: &str,
    ) -> Result<Vec<SceneDraft>> {
        if !state.checkpoint().scenes.is_empty() {
            info!("Using {} scenes from checkpoint", state.checkpoint().scenes.len());
            return Ok(state.checkpoint().scenes.clone());
        }
        info!("Generating scenes");
        let drafts = self
            .collab
            .structured
            .generate(&prompts::scenes_prompt(topic, storyline), Schema::SceneList)
            .await
            .and_then(|out| out.into_scenes())
            .inspect_err(|e| error!("Scene stage failed: {}", e))?;
        if drafts.is_empty() {
            return Err(PipelineError::EmptyScript);
        }
        for (i, d) in drafts.iter().enumerate() {
            info!("Scene {}: {}", i + 1, d.scene);
            info!("Narration {}: {}", i + 1, d.narration);
        }
        state.update(|c| {
            c.scenes = drafts.clone();
            c.status = ProjectStatus::ScenesGenerated;
        })?;
        Ok(drafts)
    }

    async fn prompts_stage(&self, state: &mut StateManager, drafts: &[SceneDraft]) -> Result<Vec<String>> {
        let existing = &state.checkpoint().image_prompts;
        if existing.len() == drafts.len() {
            info!("Using image prompts from checkpoint");
            return Ok(existing.clone());
        }
        info!("Generating image prompts for {} scenes", drafts.len());
        let mut prompts_out = Vec::with_capacity(drafts.len());
        let mut previous_scene = String::new();
        let mut previous_prompt = String::new();
        for draft in drafts {
            let request = prompts::image_prompt(&previous_scene, &previous_prompt, &draft.scene);
            let prompt = self
                .collab
                .structured
                .generate(&request, Schema::ImagePrompt)
                .await
                .and_then(|out| out.into_image_prompt())
                .inspect_err(|e| error!("Image prompt stage failed: {}", e))?;
            previous_scene = draft.scene.clone();
            previous_prompt = prompt.clone();
            prompts_out.push(prompt);
        }
        state.update(|c| {
            c.image_prompts = prompts_out.clone();
            c.status = ProjectStatus::PromptsGenerated;
        })?;
        Ok(prompts_out)
    }

    async fn media_stage(
        &self,
        project: &ProjectManager,
        state: &mut StateManager,
        drafts: &[SceneDraft],
        prompts: &[String],
    ) -> Result<Vec<Scene>> {
        let mut processed = state.checkpoint().processed_scenes.clone();
        if processed.len() >= drafts.len() {
            info!("All {} scenes already processed", processed.len());
            return Ok(processed);
        }
        let mut current_time = next_start_time(&processed);
        if !processed.is_empty() {
            info!(
                "Resuming at scene {} of {} (t={:.2}s)",
                processed.len() + 1,
                drafts.len(),
                current_time
            );
        }

        for index in processed.len()..drafts.len() {
            let draft = &drafts[index];
            let prompt = &prompts[index];

            let image_path = project.resolve_path(FileCategory::Image, &image_file_name(index))?;
            if image_path.exists() {
                info!("Image for scene {} already exists, skipping", index + 1);
            } else {
                self.collab
                    .images
                    .generate_image(prompt, &image_path)
                    .await
                    .inspect_err(|e| error!("Image generation for scene {} failed: {}", index + 1, e))?;
            }

            let audio_name = audio_file_name(index, self.collab.speech.extension());
            let audio_path = project.resolve_path(FileCategory::Audio, &audio_name)?;
            if audio_path.exists() {
                info!("Audio for scene {} already exists, skipping", index + 1);
            } else {
                self.collab
                    .speech
                    .generate_audio(&draft.narration, &audio_path)
                    .await
                    .inspect_err(|e| error!("Audio generation for scene {} failed: {}", index + 1, e))?;
            }

            let probe_path = audio_path.clone();
            let duration = tokio::task::spawn_blocking(move || audio_duration(&probe_path))
                .await
                .map_err(|e| PipelineError::Join(e.to_string()))??;

            let mut scene = Scene::new(
                draft.scene.clone(),
                image_path,
                draft.narration.clone(),
                audio_path,
                current_time,
                duration,
            )?;
            scene.transition_duration = self.transition_duration;
            info!(
                "Scene {}: {:.2}s starting at {:.2}s",
                index + 1,
                scene.duration,
                scene.start_time
            );

            current_time = scene.end_time();
            processed.push(scene);
            state.update(|c| {
                c.processed_scenes = processed.clone();
                c.status = ProjectStatus::ScenesProcessing;
            })?;
        }
        Ok(processed)
    }

    async fn assembly_stage(
        &self,
        project: &ProjectManager,
        state: &mut StateManager,
        scenes: Vec<Scene>,
    ) -> Result<PathBuf> {
        validate_timeline(&scenes)?;
        let output = project.final_video_path()?;
        let partial = project.partial_video_path()?;
        remove_partial(&partial)?;
        info!("Assembling {} scenes into {}", scenes.len(), output.display());

        let assembler = Arc::clone(&self.assembler);
        let target = partial.clone();
        let rendered = tokio::task::spawn_blocking(move || assembler.assemble(&scenes, &target))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))
            .and_then(|r| r.map_err(PipelineError::from));
        let written = match rendered {
            Ok(path) => path,
            Err(e) => {
                error!("Video assembly failed: {}", e);
                if let Err(cleanup) = remove_partial(&partial) {
                    warn!("Could not remove partial video: {}", cleanup);
                }
                return Err(e);
            }
        };

        fs::rename(&written, &output).map_err(|e| ProjectError::io(&output, e))?;
        state.update(|c| c.status = ProjectStatus::VideoCreated)?;
        Ok(output)
    }
}

/// Deletes a leftover render target; a missing file is fine.
fn remove_partial(path: &Path) -> std::result::Result<(), ProjectError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(ProjectError::io(path, e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_are_indexed() {
        assert_eq!(image_file_name(3), "scene_3.jpg");
        assert_eq!(audio_file_name(0, "wav"), "narration_0.wav");
    }
}
