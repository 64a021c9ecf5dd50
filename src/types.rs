use std::{fmt, time::Instant};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }
}

/// Keypoint names in COCO order, shared by MoveNet and PoseNet.
pub const COCO_KEYPOINT_NAMES: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

#[derive(Clone, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Detector confidence in [0, 1]; `None` when the model does not report one.
    pub score: Option<f32>,
    pub name: Option<&'static str>,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, score: f32) -> Self {
        Self {
            x,
            y,
            score: Some(score),
            name: None,
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// A keypoint without a score never passes.
    pub fn exceeds(&self, threshold: f32) -> bool {
        self.score.is_some_and(|score| score > threshold)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, index: usize) -> Option<&Keypoint> {
        self.keypoints.get(index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoseModel {
    MoveNet,
    PoseNet,
}

impl PoseModel {
    pub const ALL: [PoseModel; 2] = [PoseModel::MoveNet, PoseModel::PoseNet];

    pub fn label(&self) -> &'static str {
        match self {
            PoseModel::MoveNet => "MoveNet",
            PoseModel::PoseNet => "PoseNet",
        }
    }
}

impl fmt::Display for PoseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unscored_keypoint_never_exceeds_threshold() {
        let kp = Keypoint {
            x: 1.0,
            y: 2.0,
            score: None,
            name: None,
        };
        assert!(!kp.exceeds(0.0));
        assert!(Keypoint::new(1.0, 2.0, 0.01).exceeds(0.0));
    }

    #[test]
    fn threshold_comparison_is_strict() {
        let kp = Keypoint::new(0.0, 0.0, 0.5);
        assert!(!kp.exceeds(0.5));
        assert!(kp.exceeds(0.49));
    }

    #[test]
    fn get_out_of_range_is_none() {
        let pose = Pose::new(vec![Keypoint::new(0.0, 0.0, 0.2)]);
        assert!(pose.get(0).is_some());
        assert!(pose.get(1).is_none());
        assert!(Pose::default().get(0).is_none());
    }
}
