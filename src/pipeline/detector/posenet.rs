use anyhow::{Context, Result, anyhow, ensure};
use ndarray::Array4;
use ort::{session::Session, value::Tensor};

use super::{KeypointSource, common};
use crate::{
    config::{PoseNetArchitecture, PoseNetConfig},
    types::{COCO_KEYPOINT_NAMES, Frame, Keypoint, Pose},
};

const NUM_PARTS: usize = 17;
const RESNET_MEAN: [f32; 3] = [-123.15, -115.90, -103.06];

/// Single-pose PoseNet decoded from heatmaps and short-range offsets.
pub struct PoseNet {
    session: Session,
    architecture: PoseNetArchitecture,
    input_resolution: u32,
    output_stride: u32,
}

/// Nearest resolution the network accepts: `k * stride + 1`.
pub fn valid_resolution(resolution: u32, stride: u32) -> u32 {
    if stride == 0 || (resolution.saturating_sub(1)) % stride == 0 {
        return resolution;
    }
    (resolution / stride) * stride + 1
}

impl PoseNet {
    pub fn load(cfg: &PoseNetConfig) -> Result<Self> {
        let session = common::load_session("PoseNet", &cfg.model_path, cfg.model_url.as_deref())?;
        let input_resolution = valid_resolution(cfg.input_resolution, cfg.output_stride);
        log::info!(
            "PoseNet ready using {} ({:?}, multiplier {}, stride {}, input {}x{})",
            cfg.model_path.display(),
            cfg.architecture,
            cfg.multiplier,
            cfg.output_stride,
            input_resolution,
            input_resolution
        );
        Ok(Self {
            session,
            architecture: cfg.architecture,
            input_resolution,
            output_stride: cfg.output_stride,
        })
    }
}

impl KeypointSource for PoseNet {
    fn estimate(&mut self, frame: &Frame) -> Result<Vec<Pose>> {
        let res = self.input_resolution;
        let rgba = common::resize_rgba(frame, res, res)?;
        let input = normalize(&rgba, res as usize, self.architecture)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run PoseNet session")?;

        let mut heatmaps = None;
        let mut offsets = None;
        for idx in 0..outputs.len() {
            let array = outputs[idx].try_extract_array::<f32>()?;
            let shape = array.shape().to_vec();
            let data: Vec<f32> = array.iter().copied().collect();
            match shape.last() {
                Some(&NUM_PARTS) => heatmaps = Some((shape, data)),
                Some(&channels) if channels == NUM_PARTS * 2 => offsets = Some((shape, data)),
                _ => {}
            }
        }
        let (heat_shape, heat) =
            heatmaps.ok_or_else(|| anyhow!("PoseNet output has no 17-channel heatmap"))?;
        let (_, offs) = offsets.ok_or_else(|| anyhow!("PoseNet output has no 34-channel offsets"))?;
        ensure!(
            heat_shape.len() == 4,
            "unexpected PoseNet heatmap shape {heat_shape:?}"
        );

        let grid = (heat_shape[1], heat_shape[2]);
        let scale = (
            frame.width as f32 / res as f32,
            frame.height as f32 / res as f32,
        );
        Ok(vec![decode_single_pose(
            &heat,
            &offs,
            grid,
            self.output_stride,
            scale,
        )?])
    }
}

fn normalize(rgba: &[u8], side: usize, architecture: PoseNetArchitecture) -> Result<Array4<f32>> {
    let data: Vec<f32> = rgba
        .chunks_exact(4)
        .flat_map(|px| {
            let rgb = [px[0] as f32, px[1] as f32, px[2] as f32];
            match architecture {
                PoseNetArchitecture::MobileNetV1 => rgb.map(|v| v / 127.5 - 1.0),
                PoseNetArchitecture::ResNet50 => {
                    [rgb[0] + RESNET_MEAN[0], rgb[1] + RESNET_MEAN[1], rgb[2] + RESNET_MEAN[2]]
                }
            }
        })
        .collect();
    Array4::<f32>::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build PoseNet input tensor: {err}"))
}

/// Heatmap argmax per part, refined by offsets (y channels first, then x) and
/// scaled from network input to frame pixels.
fn decode_single_pose(
    heatmaps: &[f32],
    offsets: &[f32],
    (height, width): (usize, usize),
    stride: u32,
    (scale_x, scale_y): (f32, f32),
) -> Result<Pose> {
    let cells = height * width;
    ensure!(
        heatmaps.len() >= cells * NUM_PARTS && offsets.len() >= cells * NUM_PARTS * 2,
        "PoseNet outputs too small for a {height}x{width} grid"
    );

    let keypoints = (0..NUM_PARTS)
        .map(|part| {
            let (cell, logit) = (0..cells)
                .map(|cell| (cell, heatmaps[cell * NUM_PARTS + part]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 { cur } else { best }
                });
            let (row, col) = (cell / width, cell % width);
            let offset_y = offsets[cell * NUM_PARTS * 2 + part];
            let offset_x = offsets[cell * NUM_PARTS * 2 + NUM_PARTS + part];
            let x = (col as f32 * stride as f32 + offset_x) * scale_x;
            let y = (row as f32 * stride as f32 + offset_y) * scale_y;
            Keypoint::new(x, y, sigmoid(logit)).named(COCO_KEYPOINT_NAMES[part])
        })
        .collect();
    Ok(Pose::new(keypoints))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
