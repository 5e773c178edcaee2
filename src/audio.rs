use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use hound::WavReader;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::error::AssemblyError;

pub fn wav_duration_seconds(path: &Path) -> Result<f64, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

/// Container duration as reported by `ffprobe`.
pub fn probe_duration_seconds(path: &Path) -> Result<f64, AssemblyError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| AssemblyError::Ffmpeg(format!("failed to run ffprobe: {}", e)))?;
    if !output.status.success() {
        return Err(AssemblyError::AudioUnreadable {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.trim()
        .parse::<f64>()
        .map_err(|e| AssemblyError::AudioUnreadable {
            path: path.to_path_buf(),
            reason: format!("unexpected ffprobe output '{}': {}", text.trim(), e),
        })
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

fn measure(path: &Path) -> Result<f64, AssemblyError> {
    if is_wav(path) {
        wav_duration_seconds(path).map_err(|e| match e {
            hound::Error::IoError(io) => AssemblyError::Io(io),
            other => AssemblyError::AudioUnreadable {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })
    } else {
        // ffprobe reports permission problems as text; open first to get a real error kind.
        fs::File::open(path)?;
        probe_duration_seconds(path)
    }
}

#[cfg(unix)]
fn repair_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o600);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn repair_permissions(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

/// Playback length of a narration file. Permission errors get one repair attempt.
pub fn audio_duration(path: &Path) -> Result<f64, AssemblyError> {
    if !path.exists() {
        return Err(AssemblyError::AudioMissing(path.to_path_buf()));
    }
    match measure(path) {
        Err(AssemblyError::Io(e)) if e.kind() == ErrorKind::PermissionDenied => {
            warn!("Permission denied reading {}; repairing permissions", path.display());
            repair_permissions(path)?;
            measure(path)
        }
        other => other,
    }
}

/// How a background track of length `source` is repeated and cut to fill `required`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicLoop {
    pub repetitions: u32,
    pub duration: f64,
}

impl MusicLoop {
    pub fn plan(source: f64, required: f64) -> Self {
        let repetitions = if source > 0.0 && source < required {
            (required / source).ceil() as u32
        } else {
            1
        };
        Self {
            repetitions,
            duration: required,
        }
    }

    /// `-stream_loop` counts extra plays, not total plays.
    pub fn extra_loops(&self) -> u32 {
        self.repetitions.saturating_sub(1)
    }
}

/// Picks one file at random from `music_dir`.
pub fn choose_bg_music(music_dir: &Path) -> Result<PathBuf, AssemblyError> {
    let mut files: Vec<PathBuf> = fs::read_dir(music_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    let chosen = files
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| AssemblyError::NoMusic(music_dir.to_path_buf()))?;
    info!("Selected background music {}", chosen.display());
    Ok(chosen)
}

/// Background bed for the mix: a chosen music file, or silence when no folder is configured.
#[derive(Debug, Clone, PartialEq)]
pub enum MusicBed {
    Track { path: PathBuf, plan: MusicLoop },
    Silence { duration: f64 },
}

impl MusicBed {
    pub fn prepare(music_dir: Option<&Path>, required: f64) -> Result<Self, AssemblyError> {
        match music_dir {
            Some(dir) => {
                let path = choose_bg_music(dir)?;
                let source = probe_duration_seconds(&path)?;
                let plan = MusicLoop::plan(source, required);
                debug!(
                    "Music {:.2}s looped {}x and trimmed to {:.2}s",
                    source, plan.repetitions, plan.duration
                );
                Ok(MusicBed::Track { path, plan })
            }
            None => Ok(MusicBed::Silence { duration: required }),
        }
    }

    /// FFmpeg input arguments for this bed.
    pub fn input_args(&self) -> Vec<String> {
        match self {
            MusicBed::Track { path, plan } => vec![
                "-stream_loop".into(),
                plan.extra_loops().to_string(),
                "-i".into(),
                path.display().to_string(),
            ],
            MusicBed::Silence { duration } => vec![
                "-f".into(),
                "lavfi".into(),
                "-t".into(),
                format!("{:.3}", duration),
                "-i".into(),
                "anullsrc=r=44100:cl=stereo".into(),
            ],
        }
    }
}

/// Builds the `filter_complex` that sums the attenuated bed with every
/// narration placed at its start offset. Input 0 is the frame pipe, input 1 the
/// bed, inputs 2.. the narrations in order.
pub fn mix_filter(starts: &[f64], total: f64, music_volume: f64) -> String {
    let mut parts = vec![format!(
        "[1:a]atrim=0:{total:.3},asetpts=N/SR/TB,volume={music_volume}[bg]"
    )];
    let mut labels = String::from("[bg]");
    for (i, start) in starts.iter().enumerate() {
        let delay_ms = (start * 1000.0).round() as u64;
        parts.push(format!("[{}:a]adelay={}:all=1[n{}]", i + 2, delay_ms, i));
        labels.push_str(&format!("[n{}]", i));
    }
    parts.push(format!(
        "{}amix=inputs={}:duration=first:dropout_transition=0:normalize=0[aout]",
        labels,
        starts.len() + 1
    ));
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, seconds: f64, rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(seconds * rate as f64) as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn wav_duration_matches_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.wav");
        write_wav(&path, 2.5, 8000);
        assert!((audio_duration(&path).unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn missing_audio_is_reported() {
        let err = audio_duration(Path::new("does/not/exist.wav")).unwrap_err();
        assert!(matches!(err, AssemblyError::AudioMissing(_)));
    }

    #[test]
    fn short_music_is_looped_then_trimmed_to_exact_length() {
        let plan = MusicLoop::plan(7.0, 30.0);
        assert_eq!(plan.repetitions, 5);
        assert_eq!(plan.extra_loops(), 4);
        assert!(plan.repetitions as f64 * 7.0 >= 30.0);
        assert_eq!(plan.duration, 30.0);
    }

    #[test]
    fn long_music_is_only_trimmed() {
        let plan = MusicLoop::plan(120.0, 30.0);
        assert_eq!(plan.repetitions, 1);
        assert_eq!(plan.duration, 30.0);
    }

    #[test]
    fn empty_music_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            choose_bg_music(dir.path()),
            Err(AssemblyError::NoMusic(_))
        ));
    }

    #[test]
    fn mix_places_each_narration_at_its_offset() {
        let filter = mix_filter(&[0.0, 3.25], 6.0, 0.2);
        assert!(filter.contains("[1:a]atrim=0:6.000,asetpts=N/SR/TB,volume=0.2[bg]"));
        assert!(filter.contains("[2:a]adelay=0:all=1[n0]"));
        assert!(filter.contains("[3:a]adelay=3250:all=1[n1]"));
        assert!(filter.ends_with("[bg][n0][n1]amix=inputs=3:duration=first:dropout_transition=0:normalize=0[aout]"));
    }

    #[test]
    fn silent_bed_spans_the_timeline() {
        let bed = MusicBed::prepare(None, 12.5).unwrap();
        assert_eq!(bed, MusicBed::Silence { duration: 12.5 });
        assert!(bed.input_args().contains(&"12.500".to_string()));
    }
}
