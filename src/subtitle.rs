//! Word-by-word highlighted captions rendered as transparent RGBA overlays.

use std::fs;
use std::path::Path;

use fontdue::{Font, FontSettings};
use tracing::{debug, warn};

use crate::config::{HorizontalAnchor, SubtitleConfig, VerticalAnchor};
use crate::error::AssemblyError;
use crate::frame::RgbaFrame;
use crate::scene::Scene;

const CURRENT_COLOR: [u8; 4] = [255, 255, 0, 255];
const SPOKEN_COLOR: [u8; 4] = [255, 255, 255, 255];
const UPCOMING_COLOR: [u8; 4] = [128, 128, 128, 128];

/// A rasterized glyph positioned relative to the top-left of its word.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub x: i32,
    pub y: i32,
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<u8>,
}

/// Measures and rasterizes text. Implemented for `fontdue::Font`.
pub trait Typeface {
    fn text_width(&self, text: &str, size: f32) -> u32;
    fn glyphs(&self, text: &str, size: f32) -> Vec<Glyph>;
}

impl Typeface for Font {
    fn text_width(&self, text: &str, size: f32) -> u32 {
        let advance: f32 = text
            .chars()
            .map(|c| self.metrics(c, size).advance_width)
            .sum();
        advance.ceil().max(0.0) as u32
    }

    fn glyphs(&self, text: &str, size: f32) -> Vec<Glyph> {
        let ascent = self
            .horizontal_line_metrics(size)
            .map(|m| m.ascent)
            .unwrap_or(size * 0.8);
        let mut pen = 0.0_f32;
        let mut out = Vec::new();
        for c in text.chars() {
            let (metrics, coverage) = self.rasterize(c, size);
            if metrics.width > 0 && metrics.height > 0 {
                out.push(Glyph {
                    x: (pen + metrics.xmin as f32).round() as i32,
                    y: (ascent - (metrics.ymin + metrics.height as i32) as f32).round() as i32,
                    width: metrics.width,
                    height: metrics.height,
                    coverage,
                });
            }
            pen += metrics.advance_width;
        }
        out
    }
}

pub fn load_font(path: &Path) -> Result<Font, AssemblyError> {
    let bytes = fs::read(path)
        .map_err(|e| AssemblyError::Subtitle(format!("missing font '{}': {}", path.display(), e)))?;
    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|e| AssemblyError::Subtitle(format!("failed to parse font {}: {}", path.display(), e)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubtitleStyle {
    pub font_size: u32,
    pub highlight_delta: u32,
    pub margin: u32,
    pub vertical: VerticalAnchor,
    pub horizontal: HorizontalAnchor,
}

impl SubtitleStyle {
    pub fn line_height(&self) -> i32 {
        (self.font_size as f64 * 1.5) as i32
    }

    pub fn word_space(&self) -> u32 {
        self.font_size / 2
    }
}

impl From<&SubtitleConfig> for SubtitleStyle {
    fn from(cfg: &SubtitleConfig) -> Self {
        Self {
            font_size: cfg.font_size,
            highlight_delta: cfg.highlight_delta,
            margin: cfg.margin,
            vertical: cfg.vertical,
            horizontal: cfg.horizontal,
        }
    }
}

/// Greedy wrap: returns word indices per line. A line always takes at least
/// one word, even if that word alone is wider than `max_width`.
pub fn wrap_words(widths: &[u32], word_space: u32, max_width: u32) -> Vec<Vec<usize>> {
    let mut lines = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_width = 0u32;
    for (i, &width) in widths.iter().enumerate() {
        if current.is_empty() || current_width + width + word_space <= max_width {
            current.push(i);
            current_width += width + word_space;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push(i);
            current_width = width + word_space;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Top-left origin of every word, in word order.
pub fn layout_words(
    widths: &[u32],
    style: &SubtitleStyle,
    frame_width: u32,
    frame_height: u32,
) -> Vec<(i32, i32)> {
    let word_space = style.word_space();
    let max_width = frame_width.saturating_sub(style.margin * 2);
    let lines = wrap_words(widths, word_space, max_width);

    let line_height = style.line_height();
    let block_height = lines.len() as i32 * line_height;
    let start_y = match style.vertical {
        VerticalAnchor::Center => (frame_height as i32 - block_height) / 2,
        VerticalAnchor::Bottom => frame_height as i32 - block_height - style.margin as i32,
    };

    let mut positions = vec![(0, 0); widths.len()];
    for (row, line) in lines.iter().enumerate() {
        let line_width: u32 = line.iter().map(|&i| widths[i]).sum::<u32>()
            + word_space * (line.len() as u32).saturating_sub(1);
        let mut x = match style.horizontal {
            HorizontalAnchor::Left => style.margin as i32,
            HorizontalAnchor::Center => (frame_width as i32 - line_width as i32) / 2,
        };
        let y = start_y + row as i32 * line_height;
        for &i in line {
            positions[i] = (x, y);
            x += (widths[i] + word_space) as i32;
        }
    }
    positions
}

/// Seconds each word stays highlighted; `None` when nothing can be animated.
pub fn animation_speed(duration: f64, word_count: usize) -> Option<f64> {
    (word_count > 0 && duration > 0.0).then(|| duration / word_count as f64)
}

/// Index of the word being spoken at `t`, kept within `0..word_count`.
pub fn current_word_index(t: f64, duration: f64, word_count: usize) -> Option<usize> {
    let speed = animation_speed(duration, word_count)?;
    let index = (t.max(0.0) / speed).floor() as usize;
    Some(index.min(word_count - 1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordState {
    Spoken,
    Current,
    Upcoming,
}

pub fn word_state(index: usize, current: usize) -> WordState {
    match index.cmp(&current) {
        std::cmp::Ordering::Less => WordState::Spoken,
        std::cmp::Ordering::Equal => WordState::Current,
        std::cmp::Ordering::Greater => WordState::Upcoming,
    }
}

#[derive(Debug, Clone)]
struct PlacedWord {
    x: i32,
    y: i32,
    regular: Vec<Glyph>,
    highlighted: Vec<Glyph>,
}

/// Caption overlay for one scene, sampled by time.
#[derive(Debug, Clone)]
pub struct SubtitleClip {
    width: u32,
    height: u32,
    duration: f64,
    words: Vec<PlacedWord>,
}

impl SubtitleClip {
    pub fn build<T: Typeface>(
        scene: &Scene,
        face: &T,
        style: &SubtitleStyle,
        width: u32,
        height: u32,
    ) -> Result<Self, AssemblyError> {
        let words = scene.words();
        if animation_speed(scene.duration, words.len()).is_none() {
            return Err(AssemblyError::Subtitle(format!(
                "cannot animate {} words over {:.2}s",
                words.len(),
                scene.duration
            )));
        }

        let size = style.font_size as f32;
        let large = (style.font_size + style.highlight_delta) as f32;
        let widths: Vec<u32> = words.iter().map(|w| face.text_width(w, size)).collect();
        let positions = layout_words(&widths, style, width, height);
        debug!("Laid out {} subtitle words", words.len());

        let placed = words
            .iter()
            .zip(positions)
            .map(|(word, (x, y))| PlacedWord {
                x,
                y,
                regular: face.glyphs(word, size),
                highlighted: face.glyphs(word, large),
            })
            .collect();

        Ok(Self {
            width,
            height,
            duration: scene.duration,
            words: placed,
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Renders the overlay at `t` seconds into the scene.
    pub fn render(&self, t: f64) -> Result<RgbaFrame, AssemblyError> {
        if !t.is_finite() || t < 0.0 {
            return Err(AssemblyError::Subtitle(format!("invalid frame time {}", t)));
        }
        let current = current_word_index(t, self.duration, self.words.len())
            .ok_or_else(|| AssemblyError::Subtitle("clip has no words".into()))?;

        let mut frame = RgbaFrame::transparent(self.width, self.height);
        for (i, word) in self.words.iter().enumerate() {
            let (glyphs, color) = match word_state(i, current) {
                WordState::Current => (&word.highlighted, CURRENT_COLOR),
                WordState::Spoken => (&word.regular, SPOKEN_COLOR),
                WordState::Upcoming => (&word.regular, UPCOMING_COLOR),
            };
            for glyph in glyphs {
                blend_glyph(&mut frame, word.x + glyph.x, word.y + glyph.y, glyph, color)?;
            }
        }
        Ok(frame)
    }

    /// Like `render`, but a failed frame degrades to a transparent one.
    pub fn frame_at(&self, t: f64) -> RgbaFrame {
        self.render(t).unwrap_or_else(|e| {
            warn!("Subtitle frame at {:.3}s failed: {}", t, e);
            RgbaFrame::transparent(self.width, self.height)
        })
    }

    /// Every frame of the clip at `fps`. Each call starts again from zero.
    pub fn frames(&self, fps: u32) -> impl Iterator<Item = RgbaFrame> + '_ {
        let count = (self.duration * fps as f64).ceil() as usize;
        (0..count).map(move |k| self.frame_at(k as f64 / fps as f64))
    }
}

fn blend_glyph(
    frame: &mut RgbaFrame,
    x: i32,
    y: i32,
    glyph: &Glyph,
    color: [u8; 4],
) -> Result<(), AssemblyError> {
    if glyph.coverage.len() < glyph.width * glyph.height {
        return Err(AssemblyError::Subtitle("glyph bitmap is truncated".into()));
    }
    let (fw, fh) = (frame.width as i32, frame.height as i32);
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= fh {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= fw {
                continue;
            }
            let mask = glyph.coverage[row * glyph.width + col];
            if mask == 0 {
                continue;
            }
            let alpha = ((u16::from(mask) * u16::from(color[3])) / 255) as u8;
            let idx = (py as usize * frame.width as usize + px as usize) * 4;
            crate::frame::blend_pixel(
                &mut frame.data[idx..idx + 4],
                [color[0], color[1], color[2], alpha],
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is a solid `size/2` × `size` block.
    struct BlockFace;

    impl Typeface for BlockFace {
        fn text_width(&self, text: &str, size: f32) -> u32 {
            text.chars().count() as u32 * (size as u32 / 2)
        }

        fn glyphs(&self, text: &str, size: f32) -> Vec<Glyph> {
            let w = size as usize / 2;
            let h = size as usize;
            (0..text.chars().count())
                .map(|i| Glyph {
                    x: (i * w) as i32,
                    y: 0,
                    width: w,
                    height: h,
                    coverage: vec![255; w * h],
                })
                .collect()
        }
    }

    fn style() -> SubtitleStyle {
        SubtitleStyle {
            font_size: 10,
            highlight_delta: 2,
            margin: 5,
            vertical: VerticalAnchor::Center,
            horizontal: HorizontalAnchor::Left,
        }
    }

    fn scene(narration: &str, duration: f64) -> Scene {
        Scene::new(
            "d".into(),
            "i.jpg".into(),
            narration.into(),
            "a.wav".into(),
            0.0,
            duration,
        )
        .unwrap()
    }

    #[test]
    fn wrap_accumulates_within_max_width() {
        // 20 + 5 + 20 + 5 = 50 fits exactly; the third word does not.
        let lines = wrap_words(&[20, 20, 20], 5, 50);
        assert_eq!(lines, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn overlong_word_gets_its_own_line() {
        let lines = wrap_words(&[500, 10, 600], 5, 100);
        assert_eq!(lines, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn block_is_vertically_centred() {
        let s = style();
        // max width 90: two lines of two words each.
        let pos = layout_words(&[40, 30, 40, 30], &s, 100, 200);
        let line_height = s.line_height();
        assert_eq!(line_height, 15);
        let top = (200 - 2 * line_height) / 2;
        assert_eq!(pos[0], (5, top));
        assert_eq!(pos[1], (5 + 40 + 5, top));
        assert_eq!(pos[2], (5, top + line_height));
    }

    #[test]
    fn bottom_anchor_and_centred_lines() {
        let s = SubtitleStyle {
            vertical: VerticalAnchor::Bottom,
            horizontal: HorizontalAnchor::Center,
            ..style()
        };
        let pos = layout_words(&[20, 20], &s, 100, 200);
        // One line 20 + 5 + 20 = 45 wide.
        assert_eq!(pos[0], ((100 - 45) / 2, 200 - 15 - 5));
        assert_eq!(pos[1], ((100 - 45) / 2 + 25, 200 - 15 - 5));
    }

    #[test]
    fn highlight_covers_first_and_last_word() {
        let d = 3.7;
        let w = 9;
        assert_eq!(current_word_index(0.0, d, w), Some(0));
        assert_eq!(current_word_index(d - 1e-9, d, w), Some(w - 1));
        assert_eq!(current_word_index(d, d, w), Some(w - 1));
        assert_eq!(current_word_index(1.0, d, 0), None);
    }

    #[test]
    fn states_follow_current_index() {
        assert_eq!(word_state(0, 2), WordState::Spoken);
        assert_eq!(word_state(2, 2), WordState::Current);
        assert_eq!(word_state(3, 2), WordState::Upcoming);
    }

    #[test]
    fn zero_duration_scene_yields_no_clip() {
        let mut s = scene("hello there", 1.0);
        s.duration = 0.0;
        assert!(SubtitleClip::build(&s, &BlockFace, &style(), 100, 100).is_err());
    }

    #[test]
    fn rendered_colours_track_the_spoken_word() {
        let s = scene("ab cd", 2.0);
        let clip = SubtitleClip::build(&s, &BlockFace, &style(), 100, 100).unwrap();
        let pos = layout_words(&[10, 10], &style(), 100, 100);

        let early = clip.render(0.1).unwrap();
        assert_eq!(early.pixel(pos[0].0 as u32, pos[0].1 as u32), CURRENT_COLOR);
        let upcoming = early.pixel(pos[1].0 as u32, pos[1].1 as u32);
        assert_eq!(&upcoming[..3], &[128, 128, 128]);

        let late = clip.render(1.5).unwrap();
        assert_eq!(late.pixel(pos[0].0 as u32, pos[0].1 as u32), SPOKEN_COLOR);
        assert_eq!(late.pixel(pos[1].0 as u32, pos[1].1 as u32), CURRENT_COLOR);

        // Away from the text the overlay stays transparent.
        assert_eq!(late.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn bad_time_degrades_to_transparent() {
        let clip = SubtitleClip::build(&scene("hi", 1.0), &BlockFace, &style(), 10, 10).unwrap();
        assert!(clip.render(f64::NAN).is_err());
        assert_eq!(clip.frame_at(f64::NAN), RgbaFrame::transparent(10, 10));
    }

    #[test]
    fn frame_sequence_is_finite_and_restartable() {
        let clip = SubtitleClip::build(&scene("one two", 1.0), &BlockFace, &style(), 20, 20).unwrap();
        assert_eq!(clip.frames(10).count(), 10);
        assert_eq!(clip.frames(10).count(), 10);
    }
}
