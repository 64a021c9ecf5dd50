use std::{sync::atomic::Ordering, time::Instant};

use anyhow::{Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::{
    rgba_converter,
    video::{CaptureStream, FrameSlot},
};

// Built-in macOS cameras often reject YUYV even though it is reported.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// `(index, human name)` for every camera the platform reports.
pub fn available_cameras() -> Result<Vec<(CameraIndex, String)>> {
    Ok(query(ApiBackend::Auto)?
        .into_iter()
        .map(|info| (info.index().clone(), info.human_name()))
        .collect())
}

fn open_camera(index: &CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("no supported format for camera {index}")))
}

pub fn start_camera_stream(index: CameraIndex, slot: FrameSlot) -> Result<CaptureStream> {
    // Fail fast on the caller's thread; the capture thread reopens the device.
    drop(open_camera(&index)?);

    Ok(CaptureStream::spawn(move |stop_flag| {
        let mut camera = match open_camera(&index) {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("failed to open camera {index}: {err:?}");
                return;
            }
        };
        log::info!("camera {index} streaming at {}", camera.resolution());

        while !stop_flag.load(Ordering::Relaxed) {
            let read_start = Instant::now();
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!(
                        "camera frame read failed (after {:?}): {err:?}",
                        read_start.elapsed()
                    );
                    continue;
                }
            };

            match rgba_converter::decode_camera_buffer(&buffer) {
                Ok(frame) => slot.publish(frame),
                Err(err) => log::warn!("failed to decode camera frame: {err:?}"),
            }
        }
    }))
}
