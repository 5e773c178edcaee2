use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use fontdue::Font;
use tracing::{debug, error, info, warn};

use crate::audio::{MusicBed, audio_duration, mix_filter};
use crate::config::{SubtitleConfig, VideoConfig};
use crate::error::AssemblyError;
use crate::frame::{RgbaFrame, Transition, ZoomKind, ZoomParams, zoom_frame, zoom_scale};
use crate::scene::Scene;
use crate::subtitle::{SubtitleClip, SubtitleStyle, load_font};

/// Renders an ordered scene list into one video file.
pub trait VideoAssembler: Send + Sync {
    fn assemble(&self, scenes: &[Scene], output: &Path) -> Result<PathBuf, AssemblyError>;
}

/// One scene ready for rendering, re-timed against the surviving scenes.
#[derive(Debug, Clone)]
pub struct PreparedScene {
    pub image: RgbaFrame,
    pub audio_path: PathBuf,
    pub subtitle: Option<SubtitleClip>,
    pub start: f64,
    pub duration: f64,
    pub zoom: ZoomKind,
    pub transition: Option<(Transition, f64)>,
}

impl PreparedScene {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Image layer at `t` seconds into the scene: zoom, then entrance transition.
pub fn visual_frame(
    scene: &PreparedScene,
    t: f64,
    previous: Option<&RgbaFrame>,
    zoom: ZoomParams,
) -> RgbaFrame {
    let zoomed = zoom_frame(&scene.image, zoom_scale(scene.zoom, t, zoom));
    match scene.transition {
        Some((kind, length)) => kind.apply(zoomed, previous, t, length),
        None => zoomed,
    }
}

/// Index of the scene visible at `t`; the last scene holds past the end.
pub fn scene_at(scenes: &[PreparedScene], t: f64) -> usize {
    scenes
        .iter()
        .position(|s| t < s.end())
        .unwrap_or(scenes.len().saturating_sub(1))
}

pub struct FfmpegAssembler {
    video: VideoConfig,
    subtitles: SubtitleConfig,
}

impl FfmpegAssembler {
    pub fn new(video: VideoConfig, subtitles: SubtitleConfig) -> Self {
        Self { video, subtitles }
    }

    fn zoom_params(&self) -> ZoomParams {
        ZoomParams {
            ratio: self.video.zoom_ratio,
            initial_zoom: self.video.initial_zoom,
        }
    }

    fn frame_size(&self, first_image: &Path) -> (u32, u32) {
        match probe_image_size(first_image) {
            Ok(size) => size,
            Err(e) => {
                error!(
                    "Could not determine video dimensions ({}). Using default {}x{}.",
                    e, self.video.default_width, self.video.default_height
                );
                (self.video.default_width, self.video.default_height)
            }
        }
    }

    fn prepare_scene(
        &self,
        scene: &Scene,
        survivors: usize,
        start: f64,
        font: Option<&Font>,
        size: (u32, u32),
    ) -> Result<PreparedScene, AssemblyError> {
        if !(scene.duration > 0.0) {
            return Err(AssemblyError::InvalidScene(format!(
                "unplayable duration {}",
                scene.duration
            )));
        }
        let image = decode_image(&scene.image_path, size.0, size.1)?;
        debug!("Decoded {} at {}x{}", scene.image_path.display(), size.0, size.1);

        // Fails early on a missing or unreadable narration file.
        audio_duration(&scene.audio_path)?;

        let subtitle = font.and_then(|face| {
            let style = SubtitleStyle::from(&self.subtitles);
            match SubtitleClip::build(scene, face, &style, size.0, size.1) {
                Ok(clip) => Some(clip),
                Err(e) => {
                    warn!("No subtitles for scene: {}", e);
                    None
                }
            }
        });

        let transition = (survivors > 0).then(|| {
            let kind = Transition::random(&mut rand::thread_rng());
            (kind, scene.transition_duration.min(scene.duration))
        });

        Ok(PreparedScene {
            image,
            audio_path: scene.audio_path.clone(),
            subtitle,
            start,
            duration: scene.duration,
            zoom: ZoomKind::for_scene(survivors),
            transition,
        })
    }

    /// Loads every scene, dropping the ones that fail.
    pub fn prepare(&self, scenes: &[Scene]) -> Result<(Vec<PreparedScene>, (u32, u32)), AssemblyError> {
        let first = scenes.first().ok_or(AssemblyError::NoScenes)?;
        let size = self.frame_size(&first.image_path);

        let font = match load_font(&self.subtitles.font_path) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!("Subtitles disabled: {}", e);
                None
            }
        };

        let mut prepared: Vec<PreparedScene> = Vec::new();
        let mut current_time = 0.0;
        for scene in scenes {
            info!("Processing scene: {}", scene.description);
            match self.prepare_scene(scene, prepared.len(), current_time, font.as_ref(), size) {
                Ok(p) => {
                    current_time = p.end();
                    debug!("Scene placed at {:.2}s-{:.2}s", p.start, p.end());
                    prepared.push(p);
                }
                Err(e) => {
                    error!("Error processing scene '{}': {}", scene.description, e);
                }
            }
        }
        if prepared.is_empty() {
            return Err(AssemblyError::NoScenes);
        }
        Ok((prepared, size))
    }
}

impl VideoAssembler for FfmpegAssembler {
    fn assemble(&self, scenes: &[Scene], output: &Path) -> Result<PathBuf, AssemblyError> {
        let (prepared, (width, height)) = self.prepare(scenes)?;
        let total: f64 = prepared.iter().map(|s| s.duration).sum();
        info!(
            "Rendering {} scenes, {:.2}s at {}x{} {}fps",
            prepared.len(),
            total,
            width,
            height,
            self.video.fps
        );

        let bed = MusicBed::prepare(self.video.music_dir.as_deref(), total)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let narrations: Vec<(&Path, f64)> = prepared
            .iter()
            .map(|s| (s.audio_path.as_path(), s.start))
            .collect();
        let args = encoder_args(&EncodeJob {
            width,
            height,
            fps: self.video.fps,
            total,
            bed: &bed,
            narrations: &narrations,
            music_volume: self.video.music_volume,
            codec: &self.video.video_codec,
            output,
        });
        let mut encoder = EncoderProcess::spawn(&args, width, height)?;

        let fps = self.video.fps.max(1) as f64;
        let total_frames = (total * fps).round() as usize;
        let zoom = self.zoom_params();
        let mut previous_tail: Option<RgbaFrame> = None;
        let mut tail: Option<RgbaFrame> = None;
        let mut active = 0usize;

        for k in 0..total_frames {
            let t = k as f64 / fps;
            let index = scene_at(&prepared, t);
            if index != active {
                previous_tail = tail.take();
                active = index;
            }
            let scene = &prepared[active];
            let local = t - scene.start;

            let mut composite = visual_frame(scene, local, previous_tail.as_ref(), zoom);
            // The next scene's cross-fade starts from this image layer, without captions.
            if (k + 1) as f64 / fps >= scene.end() {
                tail = Some(composite.clone());
            }
            if let Some(clip) = &scene.subtitle {
                composite.overlay(&clip.frame_at(local));
            }
            encoder.write_frame(&composite.data)?;

            if k % (fps as usize * 5).max(1) == 0 {
                debug!("Rendered frame {}/{}", k, total_frames);
            }
        }

        encoder.finish()?;
        info!("Final video written to {}", output.display());
        Ok(output.to_path_buf())
    }
}

pub struct EncodeJob<'a> {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub total: f64,
    pub bed: &'a MusicBed,
    pub narrations: &'a [(&'a Path, f64)],
    pub music_volume: f64,
    pub codec: &'a str,
    pub output: &'a Path,
}

/// Arguments for one ffmpeg run: raw frames on stdin, bed and narrations mixed.
pub fn encoder_args(job: &EncodeJob<'_>) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s:v",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", job.width, job.height));
    args.extend(["-r".to_string(), job.fps.to_string(), "-i".into(), "-".into()]);
    args.extend(job.bed.input_args());
    for (path, _) in job.narrations {
        args.push("-i".into());
        args.push(path.display().to_string());
    }

    let starts: Vec<f64> = job.narrations.iter().map(|(_, start)| *start).collect();
    args.push("-filter_complex".into());
    args.push(mix_filter(&starts, job.total, job.music_volume));

    args.extend(
        [
            "-map", "0:v", "-map", "[aout]", "-c:v", job.codec, "-pix_fmt", "yuv420p", "-c:a",
            "aac", "-movflags", "+faststart", "-t",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(format!("{:.3}", job.total));
    args.push(job.output.display().to_string());
    args
}

/// Owns the ffmpeg child; an unfinished process is killed and reaped on drop.
struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_size: usize,
}

impl EncoderProcess {
    fn spawn(args: &[String], width: u32, height: u32) -> Result<Self, AssemblyError> {
        let frame_size = width as usize * height as usize * 4;
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    AssemblyError::Ffmpeg("ffmpeg was not found on PATH".into())
                } else {
                    AssemblyError::Ffmpeg(format!("failed to spawn ffmpeg: {}", e))
                }
            })?;
        let stdin = child.stdin.take();
        if stdin.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AssemblyError::Ffmpeg("failed to capture ffmpeg stdin".into()));
        }
        Ok(Self {
            child,
            stdin,
            frame_size,
        })
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), AssemblyError> {
        if frame.len() != self.frame_size {
            return Err(AssemblyError::Ffmpeg(format!(
                "frame size mismatch: expected {} bytes, got {}",
                self.frame_size,
                frame.len()
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AssemblyError::Ffmpeg("ffmpeg stdin already closed".into()))?;
        stdin
            .write_all(frame)
            .map_err(|e| AssemblyError::Ffmpeg(format!("failed to write frame to ffmpeg: {}", e)))
    }

    fn finish(&mut self) -> Result<(), AssemblyError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }
        let status = self.child.wait()?;
        if !status.success() {
            return Err(AssemblyError::Ffmpeg(format!("ffmpeg failed with status {}", status)));
        }
        Ok(())
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        self.stdin.take();
        if let Ok(None) = self.child.try_wait() {
            warn!("Stopping unfinished ffmpeg encoder");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn run_capture(cmd: &mut Command, what: &str) -> Result<Vec<u8>, AssemblyError> {
    let output = cmd
        .output()
        .map_err(|e| AssemblyError::Ffmpeg(format!("failed to run {}: {}", what, e)))?;
    if !output.status.success() {
        return Err(AssemblyError::Ffmpeg(format!(
            "{} failed: {}",
            what,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

pub fn probe_image_size(path: &Path) -> Result<(u32, u32), AssemblyError> {
    let stdout = run_capture(
        Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=s=x:p=0",
            ])
            .arg(path),
        "ffprobe",
    )?;
    parse_dimensions(&String::from_utf8_lossy(&stdout))
        .ok_or_else(|| AssemblyError::Ffmpeg(format!("no dimensions for {}", path.display())))
}

pub fn parse_dimensions(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().lines().next()?.split_once('x')?;
    let w = w.trim().parse().ok()?;
    let h = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

/// Decodes an image to RGBA, filling `width`×`height` by scale-then-centre-crop.
pub fn decode_image(path: &Path, width: u32, height: u32) -> Result<RgbaFrame, AssemblyError> {
    if !path.is_file() {
        return Err(AssemblyError::Io(std::io::Error::new(
            ErrorKind::NotFound,
            format!("image not found: {}", path.display()),
        )));
    }
    let filter = format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
        w = width,
        h = height
    );
    let stdout = run_capture(
        Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-vf", &filter, "-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-"]),
        "ffmpeg decode",
    )?;
    RgbaFrame::from_raw(width, height, stdout)
        .ok_or_else(|| AssemblyError::Ffmpeg(format!("short decode of {}", path.display())))
}
