use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use super::{
    detector::{DetectorLoader, KeypointSource},
    mapper::{CanvasScale, map_poses},
    scheduler::{self, CancelSource, CancelToken, DisplayClock, SharedDetector},
    skeleton::{self, DrawSurface, OverlayLayer, OverlayStyle},
    video::VideoSource,
};
use crate::types::{Frame, Pose, PoseModel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationState {
    Off,
    /// Turned on before the detector finished loading.
    Loading,
    Active,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorStatus {
    Loading,
    Ready,
    Failed(String),
}

enum DetectorSlot {
    Loading,
    Ready(SharedDetector),
    Failed(String),
}

impl DetectorSlot {
    fn status(&self) -> DetectorStatus {
        match self {
            DetectorSlot::Loading => DetectorStatus::Loading,
            DetectorSlot::Ready(_) => DetectorStatus::Ready,
            DetectorSlot::Failed(reason) => DetectorStatus::Failed(reason.clone()),
        }
    }
}

struct RunningLoop {
    cancel: CancelSource,
    handle: thread::JoinHandle<()>,
}

struct ActivationRecord {
    state: ActivationState,
    detector: DetectorSlot,
    style: OverlayStyle,
    connections: &'static [(usize, usize)],
    layer: Arc<Mutex<OverlayLayer>>,
    running: Option<RunningLoop>,
    // Cancelled loops that may still be finishing an estimate.
    retired: Vec<thread::JoinHandle<()>>,
}

/// Everything a detection loop needs besides its detector.
#[derive(Clone)]
pub struct SessionContext {
    pub video: Arc<dyn VideoSource>,
    pub refresh_hz: f32,
    /// Fixed overlay size; follows each frame's resolution when `None`.
    pub canvas_size: Option<(u32, u32)>,
}

type LoadResult = (PoseModel, anyhow::Result<Box<dyn KeypointSource>>);

/// Per-model activation records for one video session.
pub struct OverlaySession {
    ctx: SessionContext,
    records: BTreeMap<PoseModel, ActivationRecord>,
    load_tx: Sender<LoadResult>,
    load_rx: Receiver<LoadResult>,
}

impl OverlaySession {
    pub fn new(ctx: SessionContext) -> Self {
        let (load_tx, load_rx) = unbounded();
        Self {
            ctx,
            records: BTreeMap::new(),
            load_tx,
            load_rx,
        }
    }

    /// Adds a model and starts loading its detector in the background.
    pub fn register(&mut self, model: PoseModel, style: OverlayStyle, loader: DetectorLoader) {
        if self.records.contains_key(&model) {
            log::warn!("{model} is already registered, ignoring");
            return;
        }

        let (w, h) = self.ctx.canvas_size.unwrap_or((0, 0));
        self.records.insert(
            model,
            ActivationRecord {
                state: ActivationState::Off,
                detector: DetectorSlot::Loading,
                style,
                connections: skeleton::connections_for(model),
                layer: Arc::new(Mutex::new(OverlayLayer::new(w, h))),
                running: None,
                retired: Vec::new(),
            },
        );

        let load_tx = self.load_tx.clone();
        thread::spawn(move || {
            log::info!("loading {model} detector");
            let _ = load_tx.send((model, loader()));
        });
    }

    pub fn models(&self) -> impl Iterator<Item = PoseModel> + '_ {
        self.records.keys().copied()
    }

    pub fn state(&self, model: PoseModel) -> Option<ActivationState> {
        self.records.get(&model).map(|record| record.state)
    }

    pub fn detector_status(&self, model: PoseModel) -> Option<DetectorStatus> {
        self.records.get(&model).map(|record| record.detector.status())
    }

    /// Applies finished detector loads without blocking. Returns how many
    /// loads were applied.
    pub fn poll_loads(&mut self) -> usize {
        let mut applied = 0;
        while let Ok((model, result)) = self.load_rx.try_recv() {
            self.apply_load(model, result);
            applied += 1;
        }
        applied
    }

    /// Blocks until no detector is loading or `timeout` passes. Returns
    /// `true` when every load has finished.
    pub fn wait_for_detectors(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.poll_loads();
        while self.any_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.load_rx.recv_timeout(remaining) {
                Ok((model, result)) => self.apply_load(model, result),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        true
    }

    fn any_loading(&self) -> bool {
        self.records
            .values()
            .any(|record| matches!(record.detector, DetectorSlot::Loading))
    }

    fn apply_load(&mut self, model: PoseModel, result: anyhow::Result<Box<dyn KeypointSource>>) {
        let Some(record) = self.records.get_mut(&model) else {
            return;
        };

        match result {
            Ok(detector) => {
                log::info!("{model} detector ready");
                record.detector = DetectorSlot::Ready(Arc::new(Mutex::new(detector)));
                if record.state == ActivationState::Loading {
                    start_loop(model, record, &self.ctx);
                }
            }
            Err(err) => {
                log::error!("failed to load {model} detector: {err:?}");
                record.detector = DetectorSlot::Failed(format!("{err:#}"));
                if record.state == ActivationState::Loading {
                    record.state = ActivationState::Off;
                }
            }
        }
    }

    /// Starts the model's detection loop. Ignored while the model is already
    /// active or waiting for its detector.
    pub fn turn_on(&mut self, model: PoseModel) -> ActivationState {
        self.poll_loads();
        let Some(record) = self.records.get_mut(&model) else {
            log::warn!("{model} is not available in this session");
            return ActivationState::Off;
        };
        reap_retired(record);

        if record.state != ActivationState::Off {
            log::debug!("{model} is already {:?}, ignoring turn on", record.state);
            return record.state;
        }

        match &record.detector {
            DetectorSlot::Ready(_) => start_loop(model, record, &self.ctx),
            DetectorSlot::Loading => {
                log::info!("{model} detector still loading, will start when ready");
                record.state = ActivationState::Loading;
            }
            DetectorSlot::Failed(reason) => {
                log::warn!("{model} detector unavailable ({reason}), toggle has no effect");
            }
        }
        record.state
    }

    /// Stops the model's loop and blanks its layer before returning.
    pub fn turn_off(&mut self, model: PoseModel) -> ActivationState {
        let Some(record) = self.records.get_mut(&model) else {
            return ActivationState::Off;
        };

        if let Some(mut running) = record.running.take() {
            running.cancel.cancel();
            record.retired.push(running.handle);
            log::info!("{model} overlay off");
        }
        record.state = ActivationState::Off;
        // The token is already invalid, so no draw can follow this clear.
        lock_layer(&record.layer).clear();
        reap_retired(record);
        record.state
    }

    pub fn toggle(&mut self, model: PoseModel) -> ActivationState {
        match self.state(model) {
            Some(ActivationState::Off) => self.turn_on(model),
            Some(_) => self.turn_off(model),
            None => self.turn_on(model),
        }
    }

    pub fn all_off(&mut self) {
        let models: Vec<PoseModel> = self.records.keys().copied().collect();
        for model in models {
            self.turn_off(model);
        }
    }

    pub fn layer(&self, model: PoseModel) -> Option<Arc<Mutex<OverlayLayer>>> {
        self.records.get(&model).map(|record| record.layer.clone())
    }

    /// Copies of every layer in model order.
    pub fn snapshot_layers(&self) -> Vec<OverlayLayer> {
        self.records
            .values()
            .map(|record| lock_layer(&record.layer).clone())
            .collect()
    }

    pub fn video(&self) -> &Arc<dyn VideoSource> {
        &self.ctx.video
    }
}

impl Drop for OverlaySession {
    fn drop(&mut self) {
        for record in self.records.values_mut() {
            if let Some(mut running) = record.running.take() {
                running.cancel.cancel();
                record.retired.push(running.handle);
            }
        }
        for record in self.records.values_mut() {
            for handle in record.retired.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

fn lock_layer(layer: &Mutex<OverlayLayer>) -> MutexGuard<'_, OverlayLayer> {
    layer.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reap_retired(record: &mut ActivationRecord) {
    record.retired.retain(|handle| !handle.is_finished());
}

fn start_loop(model: PoseModel, record: &mut ActivationRecord, ctx: &SessionContext) {
    let DetectorSlot::Ready(detector) = &record.detector else {
        return;
    };

    let cancel = CancelSource::new();
    let token = cancel.token();
    let detector = detector.clone();
    let video = ctx.video.clone();
    let layer = record.layer.clone();
    let style = record.style.clone();
    let connections = record.connections;
    let canvas_size = ctx.canvas_size;
    let refresh_hz = ctx.refresh_hz;

    let handle = thread::spawn(move || {
        let clock = DisplayClock::from_refresh_rate(refresh_hz);
        let summary = scheduler::run(video.as_ref(), &detector, &token, &clock, |frame, poses| {
            present(&layer, &token, frame, &poses, &style, connections, canvas_size);
        });
        log::debug!("{model} detection loop exited: {summary:?}");
    });

    record.running = Some(RunningLoop { cancel, handle });
    record.state = ActivationState::Active;
    log::info!("{model} overlay on");
}

/// Redraws one model's layer for a frame. Holds the layer lock for the whole
/// draw and re-checks the token under it.
fn present(
    layer: &Mutex<OverlayLayer>,
    token: &CancelToken,
    frame: &Frame,
    poses: &[Pose],
    style: &OverlayStyle,
    connections: &[(usize, usize)],
    canvas_size: Option<(u32, u32)>,
) {
    let mut layer = lock_layer(layer);
    if token.is_cancelled() {
        return;
    }

    let (canvas_w, canvas_h) = canvas_size.unwrap_or((frame.width, frame.height));
    layer.resize(canvas_w, canvas_h);
    layer.clear();

    let Some(scale) = CanvasScale::between(
        frame.width as f32,
        frame.height as f32,
        canvas_w as f32,
        canvas_h as f32,
    ) else {
        return;
    };
    let mapped = map_poses(poses, scale);
    skeleton::draw(&mapped, &mut *layer, style, connections, scale.visual());
}
