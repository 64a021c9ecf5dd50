use anyhow::{Result, anyhow};
use image::RgbaImage;
use rayon::prelude::*;

use super::skeleton::OverlayLayer;
use crate::types::Frame;

/// Blends overlay layers over a video frame, in the order given. Layers of a
/// different size are stretched to the frame with nearest sampling.
pub fn compose(frame: &Frame, layers: &[OverlayLayer]) -> Result<RgbaImage> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot compose an empty {width}x{height} frame"));
    }
    let mut rgba = frame.rgba.clone();
    let row_len = width as usize * 4;

    for layer in layers {
        if layer.width() == 0 || layer.height() == 0 || layer.is_blank() {
            continue;
        }
        let (lw, lh) = (layer.width() as usize, layer.height() as usize);
        let src = layer.rgba();
        rgba.par_chunks_exact_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let ly = y * lh / height as usize;
                for (x, dst) in row.chunks_exact_mut(4).enumerate() {
                    let lx = x * lw / width as usize;
                    let idx = (ly * lw + lx) * 4;
                    blend(dst, &src[idx..idx + 4]);
                }
            });
    }

    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))
}

fn blend(dst: &mut [u8], src: &[u8]) {
    let alpha = src[3] as u32;
    if alpha == 0 {
        return;
    }
    for c in 0..3 {
        dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255) as u8;
    }
    dst[3] = dst[3].max(src[3]);
}
