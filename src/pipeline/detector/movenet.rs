use anyhow::{Context, Result, anyhow, ensure};
use ndarray::Array4;
use ort::{session::Session, value::Tensor};

use super::{
    KeypointSource,
    common::{self, Letterbox},
};
use crate::{
    config::MoveNetConfig,
    types::{COCO_KEYPOINT_NAMES, Frame, Keypoint, Pose},
};

const NUM_KEYPOINTS: usize = 17;

/// Single-pose MoveNet. Expects an int32 NHWC input and a `[1, 1, 17, 3]`
/// output of normalized `(y, x, score)` triples.
pub struct MoveNet {
    session: Session,
    input_size: u32,
}

impl MoveNet {
    pub fn load(cfg: &MoveNetConfig) -> Result<Self> {
        let session = common::load_session("MoveNet", &cfg.model_path, cfg.model_url.as_deref())?;
        log::info!(
            "MoveNet ready using {} (input {}x{})",
            cfg.model_path.display(),
            cfg.input_size,
            cfg.input_size
        );
        Ok(Self {
            session,
            input_size: cfg.input_size,
        })
    }
}

impl KeypointSource for MoveNet {
    fn estimate(&mut self, frame: &Frame) -> Result<Vec<Pose>> {
        let size = self.input_size as usize;
        let (rgb, letterbox) = common::letterbox_rgb(frame, self.input_size)?;
        let pixels: Vec<i32> = rgb.into_iter().map(i32::from).collect();
        let input = Array4::<i32>::from_shape_vec((1, size, size, 3), pixels)
            .map_err(|err| anyhow!("failed to build MoveNet input tensor: {err}"))?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run MoveNet session")?;
        ensure!(outputs.len() > 0, "MoveNet returned no outputs");
        let flat: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();

        Ok(vec![decode_keypoints(&flat, &letterbox, self.input_size)?])
    }
}

fn decode_keypoints(flat: &[f32], letterbox: &Letterbox, input_size: u32) -> Result<Pose> {
    ensure!(
        flat.len() >= NUM_KEYPOINTS * 3,
        "unexpected MoveNet output length: got {}, need {}",
        flat.len(),
        NUM_KEYPOINTS * 3
    );

    let side = input_size as f32;
    let keypoints = flat
        .chunks_exact(3)
        .take(NUM_KEYPOINTS)
        .zip(COCO_KEYPOINT_NAMES)
        .map(|(triple, name)| {
            let (x, y) = letterbox.unproject(triple[1] * side, triple[0] * side);
            Keypoint::new(x, y, triple[2]).named(name)
        })
        .collect();
    Ok(Pose::new(keypoints))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_normalized_triples_into_frame_pixels() {
        // 640x480 letterboxed into 192: scale 0.3, 24px of padding top and bottom.
        let letterbox = Letterbox {
            scale: 0.3,
            pad_x: 0.0,
            pad_y: 24.0,
            orig_w: 640,
            orig_h: 480,
        };
        let mut flat = vec![0.0f32; NUM_KEYPOINTS * 3];
        flat[0] = 0.5; // nose y
        flat[1] = 0.25; // nose x
        flat[2] = 0.8;
        let pose = decode_keypoints(&flat, &letterbox, 192).unwrap();

        assert_eq!(pose.keypoints.len(), NUM_KEYPOINTS);
        let nose = &pose.keypoints[0];
        assert_eq!(nose.name, Some("nose"));
        assert!((nose.x - 160.0).abs() < 1e-3);
        assert!((nose.y - 240.0).abs() < 1e-3);
        assert_eq!(nose.score, Some(0.8));
        assert_eq!(pose.keypoints[16].name, Some("right_ankle"));
    }

    #[test]
    fn short_output_is_an_error() {
        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 192,
            orig_h: 192,
        };
        assert!(decode_keypoints(&[0.0; 10], &letterbox, 192).is_err());
    }
}
