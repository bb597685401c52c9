use crate::config::Resolution;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;

/// Drawn size for a `src_w` x `src_h` image letterboxed into `target`,
/// aspect ratio preserved.
///
/// Wider-than-tall fills the target width; taller-or-square fills the target
/// height. The dependent dimension truncates toward zero, so a square image
/// computes to exactly the full canvas. Degenerate aspect ratios clamp to
/// one pixel so the resampler always has something to produce.
pub fn fitted_size(src_w: u32, src_h: u32, target: Resolution) -> (u32, u32) {
    let aspect = src_w as f64 / src_h as f64;
    if aspect > 1.0 {
        let new_w = target.width;
        let new_h = ((target.width as f64 / aspect) as u32).max(1);
        (new_w, new_h)
    } else {
        let new_h = target.height;
        let new_w = ((target.height as f64 * aspect) as u32).max(1);
        (new_w, new_h)
    }
}

/// Top-left corner that centers a `w` x `h` rectangle on the target canvas.
/// Integer division truncates, matching the letterbox contract.
pub fn centered_offset(target: Resolution, w: u32, h: u32) -> (u32, u32) {
    ((target.width - w) / 2, (target.height - h) / 2)
}

/// Scale `source` into `target` and composite it, centered, over an opaque
/// black canvas. Lanczos3 resampling; anything cheaper visibly degrades
/// letterboxed photos.
pub fn letterbox(source: &RgbImage, target: Resolution) -> Vec<u8> {
    let (new_w, new_h) = fitted_size(source.width(), source.height(), target);
    let scaled = if (new_w, new_h) == source.dimensions() {
        source.clone()
    } else {
        imageops::resize(source, new_w, new_h, FilterType::Lanczos3)
    };

    // RgbImage::new zero-fills, which is already the black background.
    let mut canvas = RgbImage::new(target.width, target.height);
    let (x, y) = centered_offset(target, new_w, new_h);
    imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
    canvas.into_raw()
}

/// Decode one image file and produce its RGB24 frame at `target` size.
/// GIFs decode to their first frame.
pub fn render_frame(path: &Path, target: Resolution) -> Result<Vec<u8>> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    Ok(letterbox(&decoded, target))
}
