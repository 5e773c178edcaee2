//! RGBA frame buffers and the per-frame image effects applied to each scene.

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaFrame {
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Alpha-composites `overlay` on top of `self`; transparent overlay pixels leave `self` untouched.
    pub fn overlay(&mut self, overlay: &RgbaFrame) {
        if overlay.width != self.width || overlay.height != self.height {
            return;
        }
        for (dst, src) in self.data.chunks_exact_mut(4).zip(overlay.data.chunks_exact(4)) {
            blend_pixel(dst, [src[0], src[1], src[2], src[3]]);
        }
    }

    /// Linear mix: `amount` 0.0 keeps `self`, 1.0 yields `top`.
    pub fn mix(&self, top: &RgbaFrame, amount: f64) -> RgbaFrame {
        let a = amount.clamp(0.0, 1.0);
        let data = self
            .data
            .iter()
            .zip(top.data.iter())
            .map(|(&b, &t)| (b as f64 * (1.0 - a) + t as f64 * a).round() as u8)
            .collect();
        RgbaFrame {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Source-over compositing of one straight-alpha pixel.
pub fn blend_pixel(dst: &mut [u8], src: [u8; 4]) {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return;
    }
    let da = u32::from(dst[3]);
    let inv = 255 - sa;
    // Output alpha, scaled by 255.
    let out_a = sa * 255 + da * inv;
    for channel in 0..3 {
        let num = u32::from(src[channel]) * sa * 255 + u32::from(dst[channel]) * da * inv;
        dst[channel] = ((num + out_a / 2) / out_a) as u8;
    }
    dst[3] = ((out_a + 127) / 255) as u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomKind {
    In,
    Out,
}

impl ZoomKind {
    /// Even scenes zoom in, odd scenes zoom out.
    pub fn for_scene(index: usize) -> Self {
        if index % 2 == 0 { ZoomKind::In } else { ZoomKind::Out }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomParams {
    pub ratio: f64,
    pub initial_zoom: f64,
}

impl Default for ZoomParams {
    fn default() -> Self {
        Self {
            ratio: 0.15,
            initial_zoom: 1.5,
        }
    }
}

/// Scale factor `t` seconds into a scene. Zoom-out never drops below 1.0 so the
/// crop always stays inside the scaled image.
pub fn zoom_scale(kind: ZoomKind, t: f64, params: ZoomParams) -> f64 {
    let t = t.max(0.0);
    match kind {
        ZoomKind::In => 1.0 + t * params.ratio,
        ZoomKind::Out => {
            (params.initial_zoom - t * (params.initial_zoom - 1.0) * params.ratio).max(1.0)
        }
    }
}

/// Scaled size and the centred crop offset that brings it back to `width`×`height`.
pub fn crop_window(width: u32, height: u32, scale: f64) -> (u32, u32, u32, u32) {
    let sw = ((width as f64 * scale) as u32).max(width);
    let sh = ((height as f64 * scale) as u32).max(height);
    let left = (sw - width) / 2;
    let top = (sh - height) / 2;
    (sw, sh, left, top)
}

/// Scales `src` about its centre by `scale` and crops back to the source size.
pub fn zoom_frame(src: &RgbaFrame, scale: f64) -> RgbaFrame {
    let (w, h) = (src.width, src.height);
    if w == 0 || h == 0 {
        return src.clone();
    }
    let (sw, sh, left, top) = crop_window(w, h, scale);
    let fx = w as f64 / sw as f64;
    let fy = h as f64 / sh as f64;
    let max_x = (w - 1) as f64;
    let max_y = (h - 1) as f64;

    let mut out = Vec::with_capacity(src.data.len());
    for y in 0..h {
        let sy = (((y + top) as f64 + 0.5) * fy - 0.5).clamp(0.0, max_y);
        let y0 = sy.floor() as u32;
        let y1 = (y0 + 1).min(h - 1);
        let wy = sy - y0 as f64;
        for x in 0..w {
            let sx = (((x + left) as f64 + 0.5) * fx - 0.5).clamp(0.0, max_x);
            let x0 = sx.floor() as u32;
            let x1 = (x0 + 1).min(w - 1);
            let wx = sx - x0 as f64;

            let p00 = src.pixel(x0, y0);
            let p10 = src.pixel(x1, y0);
            let p01 = src.pixel(x0, y1);
            let p11 = src.pixel(x1, y1);
            for c in 0..4 {
                let top_row = p00[c] as f64 * (1.0 - wx) + p10[c] as f64 * wx;
                let bottom_row = p01[c] as f64 * (1.0 - wx) + p11[c] as f64 * wx;
                out.push((top_row * (1.0 - wy) + bottom_row * wy).round() as u8);
            }
        }
    }
    RgbaFrame {
        width: w,
        height: h,
        data: out,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Blend over the previous scene's last frame.
    CrossfadeIn,
    /// Blend up from black.
    FadeIn,
}

impl Transition {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            Transition::CrossfadeIn
        } else {
            Transition::FadeIn
        }
    }

    /// Applies the entrance effect `t` seconds into the scene.
    pub fn apply(
        self,
        frame: RgbaFrame,
        previous: Option<&RgbaFrame>,
        t: f64,
        duration: f64,
    ) -> RgbaFrame {
        if duration <= 0.0 || t >= duration {
            return frame;
        }
        let progress = (t / duration).clamp(0.0, 1.0);
        let base = match (self, previous) {
            (Transition::CrossfadeIn, Some(prev))
                if prev.width == frame.width && prev.height == frame.height =>
            {
                prev.clone()
            }
            _ => RgbaFrame::filled(frame.width, frame.height, [0, 0, 0, 255]),
        };
        base.mix(&frame, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaFrame {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 10) as u8, (y * 10) as u8, 0, 255]);
            }
        }
        RgbaFrame::from_raw(w, h, data).unwrap()
    }

    #[test]
    fn zoom_in_grows_linearly() {
        let p = ZoomParams::default();
        assert_eq!(zoom_scale(ZoomKind::In, 0.0, p), 1.0);
        assert!((zoom_scale(ZoomKind::In, 2.0, p) - 1.3).abs() < 1e-12);
    }

    #[test]
    fn zoom_out_shrinks_toward_one() {
        let p = ZoomParams::default();
        assert_eq!(zoom_scale(ZoomKind::Out, 0.0, p), 1.5);
        let mid = zoom_scale(ZoomKind::Out, 2.0, p);
        assert!(mid < 1.5 && mid > 1.0);
        assert_eq!(zoom_scale(ZoomKind::Out, 100.0, p), 1.0);
    }

    #[test]
    fn zoom_alternates_by_scene_index() {
        assert_eq!(ZoomKind::for_scene(0), ZoomKind::In);
        assert_eq!(ZoomKind::for_scene(1), ZoomKind::Out);
        assert_eq!(ZoomKind::for_scene(2), ZoomKind::In);
    }

    #[test]
    fn crop_is_centred() {
        assert_eq!(crop_window(100, 200, 1.5), (150, 300, 25, 50));
        assert_eq!(crop_window(100, 200, 1.0), (100, 200, 0, 0));
    }

    #[test]
    fn zoomed_frame_keeps_dimensions() {
        let src = gradient(16, 9);
        let out = zoom_frame(&src, 1.4);
        assert_eq!((out.width, out.height), (16, 9));
        assert_eq!(out.data.len(), src.data.len());
    }

    #[test]
    fn unit_zoom_is_identity() {
        let src = gradient(8, 6);
        assert_eq!(zoom_frame(&src, 1.0), src);
    }

    #[test]
    fn zoom_magnifies_the_centre() {
        let src = gradient(20, 20);
        let out = zoom_frame(&src, 2.0);
        // Left edge of the output now shows content from a quarter of the way in.
        let edge = out.pixel(0, 10)[0];
        assert!(edge >= 40 && edge <= 60, "edge red was {}", edge);
    }

    #[test]
    fn fade_starts_black_and_ends_on_frame() {
        let frame = RgbaFrame::filled(2, 2, [200, 100, 50, 255]);
        let start = Transition::FadeIn.apply(frame.clone(), None, 0.0, 1.0);
        assert_eq!(start.pixel(0, 0), [0, 0, 0, 255]);
        let half = Transition::FadeIn.apply(frame.clone(), None, 0.5, 1.0);
        assert_eq!(half.pixel(0, 0), [100, 50, 25, 255]);
        let done = Transition::FadeIn.apply(frame.clone(), None, 1.0, 1.0);
        assert_eq!(done, frame);
    }

    #[test]
    fn crossfade_starts_on_previous_frame() {
        let prev = RgbaFrame::filled(2, 2, [10, 20, 30, 255]);
        let frame = RgbaFrame::filled(2, 2, [200, 200, 200, 255]);
        let start = Transition::CrossfadeIn.apply(frame, Some(&prev), 0.0, 1.0);
        assert_eq!(start, prev);
    }

    #[test]
    fn transparent_overlay_is_a_no_op() {
        let mut base = gradient(4, 4);
        let before = base.clone();
        base.overlay(&RgbaFrame::transparent(4, 4));
        assert_eq!(base, before);
    }

    #[test]
    fn opaque_overlay_replaces_pixels() {
        let mut base = gradient(2, 2);
        base.overlay(&RgbaFrame::filled(2, 2, [255, 255, 0, 255]));
        assert_eq!(base.pixel(1, 1), [255, 255, 0, 255]);
    }
}
