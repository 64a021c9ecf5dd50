use std::path::Path;

use anyhow::{Context, Result, ensure};
use fast_image_resize as fir;
use ort::session::{Session, builder::GraphOptimizationLevel};

use crate::{model_download::ensure_model_file, types::Frame};

#[derive(Clone, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl Letterbox {
    /// Maps a point in the padded square back to frame pixels.
    pub fn unproject(&self, x: f32, y: f32) -> (f32, f32) {
        let px = (x - self.pad_x) / self.scale;
        let py = (y - self.pad_y) / self.scale;
        (
            px.clamp(0.0, self.orig_w.saturating_sub(1) as f32),
            py.clamp(0.0, self.orig_h.saturating_sub(1) as f32),
        )
    }
}

pub fn load_session(label: &str, model_path: &Path, model_url: Option<&str>) -> Result<Session> {
    ensure_model_file(label, model_path, model_url)?;
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load {label} from {}", model_path.display()))?;
    Ok(session)
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    ensure!(
        frame.width > 0 && frame.height > 0,
        "frame has no pixels ({}x{})",
        frame.width,
        frame.height
    );
    ensure!(
        frame.rgba.len() == expected_len,
        "frame buffer size mismatch: got {}, expected {}",
        frame.rgba.len(),
        expected_len
    );
    Ok(())
}

/// Bilinear resize of the frame to `width`x`height`, still RGBA.
pub fn resize_rgba(frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>> {
    check_frame(frame)?;
    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .context("fast resize failed")?;
    Ok(dst_image.into_vec())
}

/// Aspect-preserving resize into a black `size`x`size` square. Returns packed
/// RGB bytes.
pub fn letterbox_rgb(frame: &Frame, size: u32) -> Result<(Vec<u8>, Letterbox)> {
    check_frame(frame)?;
    let scale = size as f32 / frame.width.max(frame.height) as f32;
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, size);
    let resized = resize_rgba(frame, new_w, new_h)?;

    let pad_x = ((size - new_w) / 2) as usize;
    let pad_y = ((size - new_h) / 2) as usize;
    let side = size as usize;
    let mut canvas = vec![0u8; side * side * 3];
    for row in 0..new_h as usize {
        let src_row = &resized[row * new_w as usize * 4..(row + 1) * new_w as usize * 4];
        let dst_start = ((pad_y + row) * side + pad_x) * 3;
        let dst_row = &mut canvas[dst_start..dst_start + new_w as usize * 3];
        for (dst, src) in dst_row.chunks_exact_mut(3).zip(src_row.chunks_exact(4)) {
            dst.copy_from_slice(&src[..3]);
        }
    }

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };
    Ok((canvas, letterbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Frame::new(rgba, width, height)
    }

    fn close(actual: &[u8], expected: &[u8]) -> bool {
        actual.len() == expected.len()
            && actual
                .iter()
                .zip(expected)
                .all(|(a, e)| (*a as i16 - *e as i16).abs() <= 1)
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = solid_frame(64, 32, [200, 100, 50]);
        let (canvas, letterbox) = letterbox_rgb(&frame, 16).unwrap();
        assert_eq!(canvas.len(), 16 * 16 * 3);
        assert_eq!(letterbox.scale, 0.25);
        assert_eq!((letterbox.pad_x, letterbox.pad_y), (0.0, 4.0));
        // Top padding row is black, the centre carries the frame colour.
        assert_eq!(&canvas[..3], &[0, 0, 0]);
        let centre = (8 * 16 + 8) * 3;
        assert!(close(&canvas[centre..centre + 3], &[200, 100, 50]));
    }

    #[test]
    fn unproject_inverts_letterbox_and_clamps() {
        let letterbox = Letterbox {
            scale: 0.25,
            pad_x: 0.0,
            pad_y: 4.0,
            orig_w: 64,
            orig_h: 32,
        };
        assert_eq!(letterbox.unproject(8.0, 8.0), (32.0, 16.0));
        assert_eq!(letterbox.unproject(-3.0, 0.0), (0.0, 0.0));
        assert_eq!(letterbox.unproject(100.0, 100.0), (63.0, 31.0));
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(resize_rgba(&frame, 2, 2).is_err());
        let empty = Frame::new(Vec::new(), 0, 0);
        assert!(letterbox_rgb(&empty, 8).is_err());
    }

    #[test]
    fn resize_produces_requested_dimensions() {
        let frame = solid_frame(10, 6, [9, 9, 9]);
        let resized = resize_rgba(&frame, 5, 3).unwrap();
        assert_eq!(resized.len(), 5 * 3 * 4);
        assert!(resized.chunks_exact(4).all(|px| close(px, &[9, 9, 9, 255])));
    }
}
