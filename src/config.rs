use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::{pipeline::skeleton::OverlayStyle, types::PoseModel};

pub const DEFAULT_CONFIG_PATH: &str = "pose-overlay.toml";

/// Largest accepted fixed canvas side, in pixels.
pub const MAX_CANVAS_SIDE: u32 = 8192;
/// Largest accepted `dot_radius` and `line_width`, in canvas pixels.
pub const MAX_STROKE: f32 = 256.0;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    pub display: DisplayConfig,
    pub movenet: MoveNetConfig,
    pub posenet: PoseNetConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Detection loops run at most once per refresh tick.
    pub refresh_hz: f32,
    /// Fixed overlay size; follows the video resolution when unset.
    pub canvas_width: Option<u32>,
    pub canvas_height: Option<u32>,
    /// Playback rate for frame directories.
    pub playback_fps: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60.0,
            canvas_width: None,
            canvas_height: None,
            playback_fps: 30.0,
        }
    }
}

impl DisplayConfig {
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        match (self.canvas_width, self.canvas_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

/// Single-pose MoveNet (lightning at 192, thunder at 256).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MoveNetConfig {
    pub color: [u8; 4],
    pub confidence_threshold: f32,
    pub dot_radius: f32,
    pub line_width: f32,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub input_size: u32,
}

impl Default for MoveNetConfig {
    fn default() -> Self {
        Self {
            color: [239, 68, 68, 255],
            confidence_threshold: 0.3,
            dot_radius: 4.0,
            line_width: 2.0,
            model_path: PathBuf::from("models").join("movenet_singlepose_lightning.onnx"),
            model_url: None,
            input_size: 192,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub enum PoseNetArchitecture {
    #[serde(rename = "mobilenet_v1")]
    MobileNetV1,
    #[serde(rename = "resnet50")]
    ResNet50,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseNetConfig {
    pub color: [u8; 4],
    pub confidence_threshold: f32,
    pub dot_radius: f32,
    pub line_width: f32,
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub architecture: PoseNetArchitecture,
    pub input_resolution: u32,
    pub output_stride: u32,
    pub multiplier: f32,
}

impl Default for PoseNetConfig {
    fn default() -> Self {
        Self {
            color: [59, 130, 246, 255],
            confidence_threshold: 0.5,
            dot_radius: 4.0,
            line_width: 2.0,
            model_path: PathBuf::from("models").join("posenet_mobilenet_v1_075.onnx"),
            model_url: None,
            architecture: PoseNetArchitecture::MobileNetV1,
            input_resolution: 257,
            output_stride: 16,
            multiplier: 0.75,
        }
    }
}

impl OverlayConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: OverlayConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path, then `pose-overlay.toml` in the working directory, then
    /// defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load(fallback);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.display.refresh_hz > 0.0,
            "display.refresh_hz must be positive"
        );
        ensure!(
            self.display.playback_fps > 0.0,
            "display.playback_fps must be positive"
        );
        ensure!(
            self.display.canvas_width.is_some() == self.display.canvas_height.is_some(),
            "display.canvas_width and display.canvas_height must be set together"
        );
        if let Some((w, h)) = self.display.canvas_size() {
            ensure!(w > 0 && h > 0, "canvas size must be non-zero");
            ensure!(
                w <= MAX_CANVAS_SIDE && h <= MAX_CANVAS_SIDE,
                "canvas size {w}x{h} exceeds {MAX_CANVAS_SIDE}x{MAX_CANVAS_SIDE}"
            );
        }
        for model in PoseModel::ALL {
            let style = self.style_for(model);
            let threshold = style.confidence_threshold;
            ensure!(
                (0.0..=1.0).contains(&threshold),
                "{model} confidence_threshold must be within [0, 1], got {threshold}"
            );
            let strokes = [("dot_radius", style.dot_radius), ("line_width", style.line_width)];
            for (name, value) in strokes {
                ensure!(
                    value > 0.0 && value <= MAX_STROKE,
                    "{model} {name} must be within (0, {MAX_STROKE}], got {value}"
                );
            }
        }
        ensure!(self.movenet.input_size > 0, "movenet.input_size must be positive");
        ensure!(
            matches!(self.posenet.output_stride, 8 | 16 | 32),
            "posenet.output_stride must be 8, 16 or 32"
        );
        ensure!(
            self.posenet.input_resolution >= self.posenet.output_stride,
            "posenet.input_resolution must be at least output_stride"
        );
        Ok(())
    }

    pub fn style_for(&self, model: PoseModel) -> OverlayStyle {
        match model {
            PoseModel::MoveNet => OverlayStyle {
                color: self.movenet.color,
                confidence_threshold: self.movenet.confidence_threshold,
                dot_radius: self.movenet.dot_radius,
                line_width: self.movenet.line_width,
            },
            PoseModel::PoseNet => OverlayStyle {
                color: self.posenet.color,
                confidence_threshold: self.posenet.confidence_threshold,
                dot_radius: self.posenet.dot_radius,
                line_width: self.posenet.line_width,
            },
        }
    }
}
