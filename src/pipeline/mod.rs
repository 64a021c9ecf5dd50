pub mod activation;
#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod compositor;
pub mod detector;
pub mod mapper;
#[cfg(feature = "camera-nokhwa")]
pub mod rgba_converter;
pub mod scheduler;
pub mod skeleton;
pub mod video;

pub use activation::{OverlaySession, SessionContext};
pub use compositor::compose;
pub use video::{FrameSlot, MediaError, open_media};
