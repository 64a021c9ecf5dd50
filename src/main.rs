mod config;
mod console;
mod model_download;
mod pipeline;
mod types;

use std::{io, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use config::OverlayConfig;
use pipeline::{FrameSlot, MediaError, OverlaySession, SessionContext, detector, open_media};
use types::PoseModel;

const USAGE: &str = "usage: pose-overlay <frames-dir | camera:N> [--config PATH]";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut media = None;
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => media = Some(arg),
        }
    }

    let Some(media) = media else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    let config = OverlayConfig::resolve(config_path.as_deref())?;

    let slot = FrameSlot::default();
    let stream = match open_media(&media, slot.clone(), config.display.playback_fps) {
        Ok(stream) => stream,
        Err(err @ MediaError::NotAVideo { .. }) => {
            log::warn!("{err}");
            eprintln!("Please select a video. {err}");
            return Ok(());
        }
        Err(err) => return Err(err).with_context(|| format!("failed to open {media}")),
    };

    let mut session = OverlaySession::new(SessionContext {
        video: Arc::new(slot),
        refresh_hz: config.display.refresh_hz,
        canvas_size: config.display.canvas_size(),
    });
    for model in PoseModel::ALL {
        session.register(model, config.style_for(model), detector::loader_for(model, &config));
    }

    let result = console::run(&mut session, io::stdin().lock());

    drop(session);
    stream.stop();
    result
}
