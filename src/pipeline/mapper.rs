use crate::types::{Keypoint, Pose};

/// Per-axis scale from a source frame to a destination canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasScale {
    pub x: f32,
    pub y: f32,
}

impl CanvasScale {
    /// `None` when either source dimension is not positive.
    pub fn between(src_w: f32, src_h: f32, dst_w: f32, dst_h: f32) -> Option<Self> {
        if !(src_w > 0.0 && src_h > 0.0) {
            return None;
        }
        Some(Self {
            x: dst_w / src_w,
            y: dst_h / src_h,
        })
    }

    /// Uniform factor for stroke width and dot radius, so markers keep their
    /// proportions under non-uniform scaling.
    pub fn visual(&self) -> f32 {
        self.x.min(self.y)
    }

    pub fn apply(&self, keypoint: &Keypoint) -> Keypoint {
        Keypoint {
            x: keypoint.x * self.x,
            y: keypoint.y * self.y,
            ..keypoint.clone()
        }
    }
}

pub fn map(
    keypoint: &Keypoint,
    src_w: f32,
    src_h: f32,
    dst_w: f32,
    dst_h: f32,
) -> Option<Keypoint> {
    CanvasScale::between(src_w, src_h, dst_w, dst_h).map(|scale| scale.apply(keypoint))
}

pub fn map_poses(poses: &[Pose], scale: CanvasScale) -> Vec<Pose> {
    poses
        .iter()
        .map(|pose| Pose::new(pose.keypoints.iter().map(|kp| scale.apply(kp)).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_dimensions_map_to_identity() {
        let kp = Keypoint::new(123.5, 77.25, 0.8).named("nose");
        for (w, h) in [(1.0, 1.0), (640.0, 480.0), (1920.0, 1080.0)] {
            assert_eq!(map(&kp, w, h, w, h), Some(kp.clone()));
        }
    }

    #[test]
    fn doubling_the_canvas_doubles_positions() {
        let kp = Keypoint::new(31.0, 17.0, 0.4);
        let mapped = map(&kp, 320.0, 240.0, 640.0, 480.0).unwrap();
        assert_eq!(mapped.x, 62.0);
        assert_eq!(mapped.y, 34.0);
        assert_eq!(mapped.score, kp.score);
    }

    #[test]
    fn non_uniform_scale_uses_smaller_axis_for_visuals() {
        let scale = CanvasScale::between(100.0, 100.0, 300.0, 150.0).unwrap();
        assert_eq!(scale.x, 3.0);
        assert_eq!(scale.y, 1.5);
        assert_eq!(scale.visual(), 1.5);
    }

    #[test]
    fn zero_source_dimensions_are_skipped() {
        let kp = Keypoint::new(1.0, 1.0, 1.0);
        assert!(map(&kp, 0.0, 480.0, 640.0, 480.0).is_none());
        assert!(map(&kp, 640.0, 0.0, 640.0, 480.0).is_none());
        assert!(map(&kp, f32::NAN, 480.0, 640.0, 480.0).is_none());
    }

    #[test]
    fn zero_destination_collapses_without_dividing() {
        let kp = Keypoint::new(10.0, 20.0, 1.0);
        let mapped = map(&kp, 640.0, 480.0, 0.0, 0.0).unwrap();
        assert_eq!((mapped.x, mapped.y), (0.0, 0.0));
    }
}
