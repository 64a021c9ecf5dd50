use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{
    pipeline::{OverlaySession, compose},
    types::PoseModel,
};

/// Models that have a control but no detector behind it.
const PLACEHOLDER_MODELS: &[&str] = &["blazepose", "bodypix"];

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    AllOff,
    Toggle(PoseModel),
    Placeholder(&'static str),
    Snapshot(PathBuf),
    Status,
    Cameras,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let mut parts = line.split_whitespace();
        let word = parts.next()?.to_ascii_lowercase();
        let command = match word.as_str() {
            "off" => Command::AllOff,
            "movenet" => Command::Toggle(PoseModel::MoveNet),
            "posenet" => Command::Toggle(PoseModel::PoseNet),
            "snapshot" => match parts.next() {
                Some(path) => Command::Snapshot(PathBuf::from(path)),
                None => Command::Unknown("snapshot needs an output path".to_string()),
            },
            "status" => Command::Status,
            "cameras" => Command::Cameras,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => match PLACEHOLDER_MODELS.iter().copied().find(|name| *name == other) {
                Some(name) => Command::Placeholder(name),
                None => Command::Unknown(format!("unknown command {other:?}")),
            },
        };
        Some(command)
    }
}

pub const HELP: &str = "\
commands:
  off                 turn every overlay off
  movenet | posenet   toggle that model's overlay
  blazepose | bodypix not available
  snapshot <file>     save the current frame with overlays
  status              show model states
  cameras             list capture devices
  quit                stop playback and exit";

/// Reads commands until `quit` or end of input.
pub fn run<R: BufRead>(session: &mut OverlaySession, input: R) -> Result<()> {
    println!("{HELP}");
    for line in input.lines() {
        let line = line.context("failed to read command")?;
        session.poll_loads();
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        if !execute(session, command) {
            break;
        }
    }
    session.all_off();
    Ok(())
}

/// Returns `false` when the console should exit.
pub fn execute(session: &mut OverlaySession, command: Command) -> bool {
    match command {
        Command::AllOff => session.all_off(),
        Command::Toggle(model) => {
            let state = session.toggle(model);
            println!("{model}: {state:?}");
        }
        Command::Placeholder(name) => {
            log::warn!("{name} is not implemented");
        }
        Command::Snapshot(path) => {
            if let Err(err) = snapshot(session, &path) {
                log::error!("snapshot failed: {err:?}");
            }
        }
        Command::Status => {
            for model in session.models() {
                println!(
                    "{model}: {:?} (detector {:?})",
                    session.state(model),
                    session.detector_status(model)
                );
            }
        }
        Command::Cameras => list_cameras(),
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
        Command::Unknown(message) => println!("{message}; type help for commands"),
    }
    true
}

fn snapshot(session: &OverlaySession, path: &Path) -> Result<()> {
    let frame = session
        .video()
        .current_frame()
        .context("no video frame available yet")?;
    let image = compose(&frame, &session.snapshot_layers())?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("saved snapshot to {}", path.display());
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() {
    match crate::pipeline::camera::available_cameras() {
        Ok(cameras) if cameras.is_empty() => println!("no cameras found"),
        Ok(cameras) => {
            for (index, name) in cameras {
                println!("camera:{index}  {name}");
            }
        }
        Err(err) => log::error!("failed to enumerate cameras: {err:?}"),
    }
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() {
    println!("camera support is not compiled in");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::{
            SessionContext,
            activation::ActivationState,
            detector::KeypointSource,
            scheduler::tests::{ScriptedSource, slot_with_frame, wait_until},
            skeleton::OverlayStyle,
        },
        types::{Keypoint, Pose},
    };
    use std::{io::Cursor, sync::Arc, time::Duration};

    #[test]
    fn parses_controls() {
        assert_eq!(Command::parse("  "), None);
        assert_eq!(Command::parse("OFF"), Some(Command::AllOff));
        assert_eq!(Command::parse("movenet"), Some(Command::Toggle(PoseModel::MoveNet)));
        assert_eq!(Command::parse("PoseNet"), Some(Command::Toggle(PoseModel::PoseNet)));
        assert_eq!(Command::parse("bodypix"), Some(Command::Placeholder("bodypix")));
        assert_eq!(
            Command::parse("snapshot out.png"),
            Some(Command::Snapshot(PathBuf::from("out.png")))
        );
        assert!(matches!(Command::parse("snapshot"), Some(Command::Unknown(_))));
        assert!(matches!(Command::parse("dance"), Some(Command::Unknown(_))));
        assert_eq!(Command::parse("exit"), Some(Command::Quit));
    }

    fn session() -> OverlaySession {
        let mut session = OverlaySession::new(SessionContext {
            video: Arc::new(slot_with_frame(32, 32)),
            refresh_hz: 500.0,
            canvas_size: None,
        });
        let style = OverlayStyle {
            color: [0, 255, 0, 255],
            confidence_threshold: 0.3,
            dot_radius: 2.0,
            line_width: 1.0,
        };
        for model in PoseModel::ALL {
            let source = ScriptedSource::new(Pose::new(vec![Keypoint::new(5.0, 5.0, 0.9)]));
            session.register(
                model,
                style.clone(),
                Box::new(move || Ok(Box::new(source) as Box<dyn KeypointSource>)),
            );
        }
        assert!(session.wait_for_detectors(Duration::from_secs(5)));
        session
    }

    #[test]
    fn placeholders_and_unknown_commands_change_nothing() {
        let mut session = session();
        assert!(execute(&mut session, Command::Placeholder("blazepose")));
        assert!(execute(&mut session, Command::Unknown("x".into())));
        for model in PoseModel::ALL {
            assert_eq!(session.state(model), Some(ActivationState::Off));
        }
        assert!(!execute(&mut session, Command::Quit));
    }

    #[test]
    fn scripted_input_toggles_and_snapshots() {
        let mut session = session();
        assert!(execute(&mut session, Command::Toggle(PoseModel::MoveNet)));
        assert_eq!(session.state(PoseModel::MoveNet), Some(ActivationState::Active));
        let layer = session.layer(PoseModel::MoveNet).unwrap();
        assert!(wait_until(Duration::from_secs(5), || !layer.lock().unwrap().is_blank()));

        let out =
            std::env::temp_dir().join(format!("pose-overlay-snap-{}.png", std::process::id()));
        assert!(execute(&mut session, Command::Snapshot(out.clone())));
        let saved = image::open(&out).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (32, 32));
        assert_eq!(saved.get_pixel(5, 5).0, [0, 255, 0, 255]);
        let _ = std::fs::remove_file(&out);

        let script = Cursor::new("posenet\noff\nquit\nmovenet\n");
        run(&mut session, script).unwrap();
        for model in PoseModel::ALL {
            assert_eq!(session.state(model), Some(ActivationState::Off));
        }
    }
}
