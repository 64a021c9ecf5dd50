use anyhow::{Result, anyhow, ensure};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Byte layout of uncompressed camera pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Packed {
    Rgb,
    Bgr,
    Gray,
}

impl Packed {
    fn bytes_per_pixel(self) -> usize {
        match self {
            Packed::Rgb | Packed::Bgr => 3,
            Packed::Gray => 1,
        }
    }
}

pub fn decode_camera_buffer(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = buffer.buffer();

    let (rgba, width, height) = match buffer.source_frame_format() {
        FrameFormat::NV12 => (nv12(data, width, height)?, width, height),
        FrameFormat::YUYV => (yuyv(data, width, height)?, width, height),
        FrameFormat::MJPEG => mjpeg(data)?,
        FrameFormat::RAWRGB => (expand(data, width, height, Packed::Rgb)?, width, height),
        FrameFormat::RAWBGR => (expand(data, width, height, Packed::Bgr)?, width, height),
        FrameFormat::GRAY => (expand(data, width, height, Packed::Gray)?, width, height),
    };

    Ok(Frame::new(rgba, width, height))
}

fn nv12(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let luma_len = width as usize * height as usize;
    let chroma_len = luma_len / 2;
    ensure!(
        data.len() >= luma_len + chroma_len,
        "NV12 buffer too small: got {}, expected {}",
        data.len(),
        luma_len + chroma_len
    );

    let image = YuvBiPlanarImage {
        y_plane: &data[..luma_len],
        y_stride: width,
        uv_plane: &data[luma_len..luma_len + chroma_len],
        uv_stride: width,
        width,
        height,
    };
    let mut rgba = vec![0u8; luma_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 conversion failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure!(
        data.len() >= pixels * 2,
        "YUYV buffer too small: got {}, expected {}",
        data.len(),
        pixels * 2
    );

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    let mut rgba = vec![0u8; pixels * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV conversion failed: {err:?}"))?;
    Ok(rgba)
}

/// MJPEG frames carry their own dimensions.
fn mjpeg(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder reported no image info"))?;
    let (width, height) = (u32::from(info.width), u32::from(info.height));
    ensure!(
        rgba.len() >= width as usize * height as usize * 4,
        "MJPEG decode produced too few bytes: got {}",
        rgba.len()
    );
    Ok((rgba, width, height))
}

fn expand(data: &[u8], width: u32, height: u32, layout: Packed) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let stride = layout.bytes_per_pixel();
    ensure!(
        data.len() >= pixels * stride,
        "{layout:?} buffer too small: got {}, expected {}",
        data.len(),
        pixels * stride
    );

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..pixels * stride].par_chunks_exact(stride))
        .for_each(|(dst, src)| {
            let [r, g, b] = match layout {
                Packed::Rgb => [src[0], src[1], src[2]],
                Packed::Bgr => [src[2], src[1], src[0]],
                Packed::Gray => [src[0]; 3],
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });
    Ok(rgba)
}
