mod common;
mod movenet;
mod posenet;

pub use movenet::MoveNet;
pub use posenet::PoseNet;

use crate::{
    config::OverlayConfig,
    types::{Frame, Pose, PoseModel},
};

/// A pose model that can be run on video frames. Positions are reported in
/// the pixel space of the frame passed in.
pub trait KeypointSource: Send + 'static {
    fn estimate(&mut self, frame: &Frame) -> anyhow::Result<Vec<Pose>>;
}

/// Deferred detector construction, run on a loader thread.
pub type DetectorLoader = Box<dyn FnOnce() -> anyhow::Result<Box<dyn KeypointSource>> + Send>;

pub fn loader_for(model: PoseModel, config: &OverlayConfig) -> DetectorLoader {
    match model {
        PoseModel::MoveNet => {
            let cfg = config.movenet.clone();
            Box::new(move || Ok(Box::new(MoveNet::load(&cfg)?) as Box<dyn KeypointSource>))
        }
        PoseModel::PoseNet => {
            let cfg = config.posenet.clone();
            Box::new(move || Ok(Box::new(PoseNet::load(&cfg)?) as Box<dyn KeypointSource>))
        }
    }
}
