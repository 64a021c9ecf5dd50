use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use thiserror::Error;

use crate::types::Frame;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Anything that can hand out the frame currently on screen.
pub trait VideoSource: Send + Sync {
    fn current_frame(&self) -> Option<Arc<Frame>>;
}

/// Latest-frame cell shared between a capture thread and its readers.
#[derive(Clone, Debug, Default)]
pub struct FrameSlot {
    latest: Arc<RwLock<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    pub fn publish(&self, frame: Frame) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *latest = Some(Arc::new(frame));
    }
}

impl VideoSource for FrameSlot {
    fn current_frame(&self) -> Option<Arc<Frame>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{} is not a playable source: {reason}", .path.display())]
    NotAVideo { path: PathBuf, reason: &'static str },
    #[error("media source {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("invalid camera index {0:?}")]
    InvalidCamera(String),
    #[error("camera capture support is not compiled in")]
    CameraUnavailable,
    #[error("failed to read media source")]
    Io(#[from] std::io::Error),
    #[error("failed to start capture: {0:#}")]
    Capture(anyhow::Error),
}

/// Running capture thread. Stopping (or dropping) joins the thread.
#[derive(Debug)]
pub struct CaptureStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureStream {
    pub(crate) fn spawn<F>(body: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::spawn(move || body(stop_flag));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opens `camera:<index>` or a directory of still frames and starts
/// publishing into `slot`.
pub fn open_media(
    spec: &str,
    slot: FrameSlot,
    playback_fps: f32,
) -> Result<CaptureStream, MediaError> {
    if let Some(index) = spec.strip_prefix("camera:") {
        let index: u32 = index
            .trim()
            .parse()
            .map_err(|_| MediaError::InvalidCamera(index.to_string()))?;
        return open_camera(index, slot);
    }

    let path = PathBuf::from(spec);
    let frames = list_frames(&path)?;
    log::info!(
        "playing {} frames from {} at {playback_fps} fps",
        frames.len(),
        path.display()
    );
    Ok(start_frame_sequence(frames, slot, playback_fps))
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(index: u32, slot: FrameSlot) -> Result<CaptureStream, MediaError> {
    super::camera::start_camera_stream(nokhwa::utils::CameraIndex::Index(index), slot)
        .map_err(MediaError::Capture)
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(_index: u32, _slot: FrameSlot) -> Result<CaptureStream, MediaError> {
    Err(MediaError::CameraUnavailable)
}

/// Frame files of a directory in name order. Single files and directories
/// without frames are rejected.
pub fn list_frames(path: &Path) -> Result<Vec<PathBuf>, MediaError> {
    if !path.exists() {
        return Err(MediaError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(MediaError::NotAVideo {
            path: path.to_path_buf(),
            reason: "video files are not supported, pass a directory of png/jpg frames \
                     or camera:<index>",
        });
    }

    let mut frames = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.is_file() && is_frame_file(&entry_path) {
            frames.push(entry_path);
        }
    }
    if frames.is_empty() {
        return Err(MediaError::NotAVideo {
            path: path.to_path_buf(),
            reason: "the directory holds no png/jpg frames",
        });
    }
    frames.sort();
    Ok(frames)
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            FRAME_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn start_frame_sequence(
    frames: Vec<PathBuf>,
    slot: FrameSlot,
    playback_fps: f32,
) -> CaptureStream {
    let interval = Duration::from_secs_f32(1.0 / playback_fps.max(1.0));

    CaptureStream::spawn(move |stop_flag| {
        let ticker = crossbeam_channel::tick(interval);
        while !stop_flag.load(Ordering::Relaxed) {
            let mut decoded = 0usize;
            for path in &frames {
                if stop_flag.load(Ordering::Relaxed) {
                    return;
                }
                match decode_frame(path) {
                    Ok(frame) => {
                        slot.publish(frame);
                        decoded += 1;
                    }
                    Err(err) => {
                        log::warn!("failed to decode frame {}: {err:?}", path.display());
                        continue;
                    }
                }
                let _ = ticker.recv();
            }
            if decoded == 0 {
                log::error!("no decodable frames left, stopping playback");
                return;
            }
        }
    })
}

pub fn decode_frame(path: &Path) -> anyhow::Result<Frame> {
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(image.into_raw(), width, height))
}
