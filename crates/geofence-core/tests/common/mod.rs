//! Test doubles and common utilities for engine contract tests
//!
//! This module provides minimal test doubles that verify the engine's
//! observable contract without a real location service.

#![allow(dead_code)]

use geofence_core::error::PlatformError;
use geofence_core::traits::{GeofenceDelegate, GeofenceManagement, PlatformMonitor, RawTransition};
use geofence_core::{
    CustomEvent, EngineConfig, GeofenceEngine, GeofenceEventModel, GeofenceHandle, Region,
    TransitionKind,
};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

/// Counters and knobs shared between a [`ControlledPlatform`] and its control
#[derive(Default)]
pub struct PlatformControlState {
    begin_calls: AtomicUsize,
    end_calls: AtomicUsize,
    last_watched: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    failure: Mutex<Option<PlatformError>>,
    removal_failure: Mutex<Option<PlatformError>>,
}

/// A platform monitor whose behaviour the test controls
pub struct ControlledPlatform {
    /// Receiver for the engine's transition stream
    engine_rx: Mutex<Option<mpsc::UnboundedReceiver<RawTransition>>>,
    /// Delay inside `begin_watching`
    begin_delay: Duration,
    /// Delay inside `end_watching`
    end_delay: Duration,
    max_regions: Option<usize>,
    state: Arc<PlatformControlState>,
}

/// Test-side view of a [`ControlledPlatform`]
#[derive(Clone)]
pub struct PlatformControl {
    test_tx: mpsc::UnboundedSender<RawTransition>,
    state: Arc<PlatformControlState>,
}

impl ControlledPlatform {
    /// Create a platform that accepts every start immediately
    pub fn new() -> (Self, PlatformControl) {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();
        let state = Arc::new(PlatformControlState::default());

        let platform = Self {
            engine_rx: Mutex::new(Some(engine_rx)),
            begin_delay: Duration::ZERO,
            end_delay: Duration::ZERO,
            max_regions: None,
            state: state.clone(),
        };

        (platform, PlatformControl { test_tx, state })
    }

    pub fn with_begin_delay(mut self, delay: Duration) -> Self {
        self.begin_delay = delay;
        self
    }

    pub fn with_end_delay(mut self, delay: Duration) -> Self {
        self.end_delay = delay;
        self
    }

    pub fn with_max_regions(mut self, limit: usize) -> Self {
        self.max_regions = Some(limit);
        self
    }
}

impl PlatformControl {
    /// Make every following `begin_watching` fail with `error`
    pub fn fail_with(&self, error: PlatformError) {
        *self.state.failure.lock().unwrap() = Some(error);
    }

    /// Let `begin_watching` succeed again
    pub fn recover(&self) {
        *self.state.failure.lock().unwrap() = None;
    }

    /// Make every following `end_watching_regions` fail with `error`
    pub fn fail_removal_with(&self, error: PlatformError) {
        *self.state.removal_failure.lock().unwrap() = Some(error);
    }

    /// Ids passed to successful `end_watching_regions` calls, in order
    pub fn removed(&self) -> Vec<String> {
        self.state.removed.lock().unwrap().clone()
    }

    pub fn begin_calls(&self) -> usize {
        self.state.begin_calls.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.state.end_calls.load(Ordering::SeqCst)
    }

    /// Ids passed to the last successful `begin_watching`
    pub fn last_watched(&self) -> Vec<String> {
        self.state.last_watched.lock().unwrap().clone()
    }

    /// Emit a raw transition stamped now
    pub fn emit(&self, region_id: &str, kind: TransitionKind) {
        let _ = self.test_tx.send(RawTransition::now(region_id, kind));
    }

    /// Emit a raw transition with a chosen timestamp
    pub fn emit_raw(&self, raw: RawTransition) {
        let _ = self.test_tx.send(raw);
    }
}

#[async_trait::async_trait]
impl PlatformMonitor for ControlledPlatform {
    async fn begin_watching(&self, regions: &[Region]) -> Result<(), PlatformError> {
        self.state.begin_calls.fetch_add(1, Ordering::SeqCst);
        if !self.begin_delay.is_zero() {
            tokio::time::sleep(self.begin_delay).await;
        }

        if let Some(error) = self.state.failure.lock().unwrap().clone() {
            return Err(error);
        }

        *self.state.last_watched.lock().unwrap() = regions.iter().map(|r| r.id.clone()).collect();
        Ok(())
    }

    async fn end_watching(&self) {
        if !self.end_delay.is_zero() {
            tokio::time::sleep(self.end_delay).await;
        }
        self.state.end_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn end_watching_regions(&self, region_ids: &[String]) -> Result<(), PlatformError> {
        if let Some(error) = self.state.removal_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.state
            .removed
            .lock()
            .unwrap()
            .extend(region_ids.iter().cloned());
        Ok(())
    }

    fn transitions(&self) -> Pin<Box<dyn Stream<Item = RawTransition> + Send + 'static>> {
        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("transitions() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn max_regions(&self) -> Option<usize> {
        self.max_regions
    }

    fn platform_name(&self) -> &'static str {
        "controlled"
    }
}

/// Delegate that records everything it receives
#[derive(Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<GeofenceEventModel>>,
    customs: Mutex<Vec<CustomEvent>>,
    init_calls: AtomicUsize,
    /// Call `stop_monitoring` from inside the callback on EXIT
    stop_on_exit: AtomicBool,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stopping_on_exit() -> Arc<Self> {
        let delegate = Self::default();
        delegate.stop_on_exit.store(true, Ordering::SeqCst);
        Arc::new(delegate)
    }

    pub fn events(&self) -> Vec<GeofenceEventModel> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds_for(&self, region_id: &str) -> Vec<TransitionKind> {
        self.events()
            .into_iter()
            .filter(|e| e.region_id == region_id)
            .map(|e| e.kind)
            .collect()
    }

    pub fn customs(&self) -> Vec<CustomEvent> {
        self.customs.lock().unwrap().clone()
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

impl GeofenceDelegate for RecordingDelegate {
    fn geofence_event(&self, event: &GeofenceEventModel, manager: &dyn GeofenceManagement) {
        self.events.lock().unwrap().push(event.clone());
        if event.kind == TransitionKind::Exit && self.stop_on_exit.load(Ordering::SeqCst) {
            // Settles later on the engine task; the callback must not wait for it
            drop(manager.stop_monitoring());
        }
    }

    fn custom_event(&self, event: &CustomEvent, _manager: &dyn GeofenceManagement) {
        self.customs.lock().unwrap().push(event.clone());
    }

    fn on_init_geofences_module(&self, _manager: &dyn GeofenceManagement) {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A running engine plus the means to stop it
pub struct Harness {
    pub handle: GeofenceHandle,
    pub control: PlatformControl,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<geofence_core::Result<()>>>,
}

impl Harness {
    /// Spawn an engine over a default `ControlledPlatform`
    pub fn start(dwell: Duration) -> Self {
        let (platform, control) = ControlledPlatform::new();
        Self::start_with(platform, control, dwell)
    }

    /// Spawn an engine over a configured platform
    pub fn start_with(platform: ControlledPlatform, control: PlatformControl, dwell: Duration) -> Self {
        let config = EngineConfig::default().with_dwell_interval(dwell);
        let (engine, handle) =
            GeofenceEngine::new(Box::new(platform), config).expect("engine construction succeeds");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(engine.run_with_shutdown(Some(shutdown_rx)));

        Self {
            handle,
            control,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Register `delegate` and wait until the engine has processed it
    pub async fn register(&self, delegate: Arc<RecordingDelegate>) {
        let delegate: Arc<dyn GeofenceDelegate> = delegate;
        self.handle.register_delegate(delegate).unwrap();
        self.sync().await;
    }

    /// Round-trip through the command queue
    ///
    /// Every command enqueued before this call has been handled when it
    /// returns. Platform transitions travel on a separate stream and need
    /// [`wait_until`] instead.
    pub async fn sync(&self) {
        self.handle.regions().await.unwrap();
    }

    /// Signal shutdown and wait for the engine task to finish
    pub async fn shutdown(mut self) -> geofence_core::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let task = self.task.take().expect("engine task present");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("engine should terminate within 5 seconds")
            .expect("engine task should not panic")
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// A valid region at a distinct point
pub fn region(id: &str) -> Region {
    let offset = id.bytes().map(f64::from).sum::<f64>() / 1000.0;
    Region::new(id, 10.0 + offset, 20.0 + offset, 100.0)
}

/// Dwell long enough that repeats inside a test are always suppressed
pub const LONG_DWELL: Duration = Duration::from_secs(60);
