//! Core geofence engine
//!
//! The GeofenceEngine is responsible for:
//! - Driving the monitoring state machine for start/stop requests
//! - Populating the region store and registering it with the platform
//! - Removing regions from a live session and honouring region expiry
//! - Debouncing raw transitions from the platform
//! - Dispatching accepted transitions and custom events to the delegate
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐                    ┌──────────────────┐
//! │ GeofenceHandle │─── Command ───┐    │ PlatformMonitor  │
//! └────────────────┘               │    └──────────────────┘
//!                                  ▼             │ RawTransition
//!                         ┌────────────────┐     │
//!                         │ GeofenceEngine │◀────┘
//!                         └────────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//! ┌───────────────┐        ┌───────────────┐        ┌───────────────┐
//! │  RegionStore  │        │   Debouncer   │        │  Dispatcher   │
//! │  (session)    │        │  (filter)     │        │  (delegate)   │
//! └───────────────┘        └───────────────┘        └───────────────┘
//! ```
//!
//! ## State Machine
//!
//! ```text
//! Idle ──start──▶ Starting ──ok──▶ Monitoring ──stop──▶ Stopping ──▶ Idle
//!                    │
//!                    └──err──▶ Failed ──start──▶ Starting
//! ```
//!
//! The engine task is the single writer of all session state. Commands
//! and raw transitions are handled one at a time, so a stop issued while
//! a start is in flight runs after the start settles.

mod handle;

pub use handle::GeofenceHandle;

use handle::{Command, Query, Shared};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::debounce::{Debouncer, Verdict};
use crate::diagnostics::Diagnostics;
use crate::dispatch::{Dispatcher, PendingRequest};
use crate::error::{Error, PlatformError, Result};
use crate::model::{EventSource, Region, TransitionEvent};
use crate::store::RegionStore;
use crate::traits::{PlatformMonitor, RawTransition};

/// Monitoring session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitoringState {
    Idle,
    Starting,
    Monitoring,
    Stopping,
    /// Last start failed; cleared by the next start
    Failed,
}

impl MonitoringState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringState::Idle => "IDLE",
            MonitoringState::Starting => "STARTING",
            MonitoringState::Monitoring => "MONITORING",
            MonitoringState::Stopping => "STOPPING",
            MonitoringState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core geofence engine
///
/// ## Lifecycle
///
/// 1. Create with [`GeofenceEngine::new()`], keep the returned handle
/// 2. Register a delegate through the handle
/// 3. Run with [`GeofenceEngine::run()`] on its own task
/// 4. Control monitoring through the handle until shutdown
///
/// Shutdown ends platform watching and rejects every request still
/// pending with `ENGINE_UNAVAILABLE`.
pub struct GeofenceEngine {
    /// OS region monitor
    platform: Box<dyn PlatformMonitor>,

    /// Regions of the current session
    store: RegionStore,

    /// Per-region duplicate suppression
    debouncer: Debouncer,

    /// Delegate slot and pending requests
    dispatcher: Dispatcher,

    /// State visible to handles
    shared: Arc<Shared>,

    /// Incoming commands
    commands: mpsc::Receiver<Command>,

    /// Handed to delegate callbacks as the manager
    handle: GeofenceHandle,
}

impl GeofenceEngine {
    /// Create a new geofence engine
    ///
    /// # Parameters
    ///
    /// - `platform`: Platform monitor implementation
    /// - `config`: Engine configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, handle). The handle is cheap to clone.
    pub fn new(
        platform: Box<dyn PlatformMonitor>,
        config: EngineConfig,
    ) -> Result<(Self, GeofenceHandle)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.command_channel_capacity);
        let diagnostics = Arc::new(Diagnostics::new());
        let shared = Arc::new(Shared::new(diagnostics.clone()));
        let handle = GeofenceHandle::new(tx, shared.clone());

        let engine = Self {
            platform,
            store: RegionStore::new(),
            debouncer: Debouncer::new(config.dwell_interval()),
            dispatcher: Dispatcher::new(diagnostics),
            shared,
            commands: rx,
            handle: handle.clone(),
        };

        Ok((engine, handle))
    }

    /// Run the engine until SIGINT
    pub async fn run(self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires or its sender is dropped
    ///
    /// With `None` this behaves like [`run()`](Self::run). Embedders and
    /// tests use this to control shutdown without OS signals.
    pub async fn run_with_shutdown(
        self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        info!(platform = self.platform.platform_name(), "Geofence engine started");

        let mut transitions = self.platform.transitions();

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for CTRL-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }

                Some(raw) = transitions.next() => {
                    self.handle_transition(raw, EventSource::Platform);
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown().await;
        info!("Geofence engine stopped");
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { regions, request } => self.start(regions, request).await,
            Command::Stop { request } => self.stop(request).await,
            Command::Remove { ids, request } => self.remove(ids, request).await,
            Command::Custom(event) => {
                debug!(name = %event.name, "Dispatching custom event");
                self.dispatcher.dispatch_custom_event(&event, &self.handle);
            }
            Command::Synthetic { region_id, kind } => {
                let raw = RawTransition::now(region_id, kind);
                self.handle_transition(raw, EventSource::Synthetic);
            }
            Command::RegisterDelegate(delegate) => {
                info!("Delegate registered");
                self.dispatcher.set_delegate(&delegate);
                self.dispatcher.notify_init(&self.handle);
            }
            Command::ClearDelegate => {
                info!("Delegate cleared");
                self.dispatcher.clear_delegate();
            }
            Command::Query(query) => self.answer(query),
        }
    }

    fn answer(&self, query: Query) {
        // A dropped reply receiver only means the caller stopped waiting
        match query {
            Query::ContainsRegion { ids, reply } => {
                let _ = reply.send(self.store.contains_any(&ids));
            }
            Query::RegionAt {
                latitude,
                longitude,
                radius,
                reply,
            } => {
                let found = self
                    .store
                    .find_by_coordinate(latitude, longitude, radius)
                    .cloned();
                let _ = reply.send(found);
            }
            Query::Regions { reply } => {
                let _ = reply.send(self.store.regions());
            }
        }
    }

    /// Handle a start request
    async fn start(&mut self, regions: Vec<Region>, request: PendingRequest) {
        let id = self.dispatcher.track(request);

        let current = {
            let mut gate = self.shared.lock_gate();
            gate.start_queued = false;
            let current = gate.state;
            if !matches!(current, MonitoringState::Monitoring | MonitoringState::Stopping) {
                gate.state = MonitoringState::Starting;
            }
            current
        };
        if matches!(current, MonitoringState::Monitoring | MonitoringState::Stopping) {
            debug!(id, state = %current, "Start rejected, session already active");
            self.settle(id, Err(Error::already_active(current.to_string())));
            return;
        }

        info!(id, regions = regions.len(), "Starting geofence monitoring");

        match self.begin_session(regions).await {
            Ok(()) => {
                self.shared.set_state(MonitoringState::Monitoring);
                info!(id, regions = self.store.len(), "Geofence monitoring active");
                self.settle(id, Ok(()));
            }
            Err(e) => {
                error!(id, kind = %e.kind(), "Failed to start monitoring: {}", e);
                self.store.clear();
                self.debouncer.reset();
                self.shared.set_state(MonitoringState::Failed);
                self.settle(id, Err(e));
            }
        }
    }

    async fn begin_session(&mut self, regions: Vec<Region>) -> Result<()> {
        if let Some(limit) = self.platform.max_regions() {
            if regions.len() > limit {
                return Err(PlatformError::MonitoringLimitExceeded {
                    requested: regions.len(),
                    limit,
                }
                .into());
            }
        }

        self.store.add_regions(regions)?;
        let snapshot = self.store.regions();
        self.platform.begin_watching(&snapshot).await?;
        Ok(())
    }

    /// Handle a stop request
    async fn stop(&mut self, request: PendingRequest) {
        let id = self.dispatcher.track(request);

        let current = self.shared.state();
        match current {
            MonitoringState::Monitoring | MonitoringState::Stopping => {
                self.shared.set_state(MonitoringState::Stopping);
                info!(id, "Stopping geofence monitoring");

                self.platform.end_watching().await;
                self.store.clear();
                self.debouncer.reset();

                self.shared.set_state(MonitoringState::Idle);
                info!(id, "Geofence monitoring stopped");
                self.settle(id, Ok(()));
            }
            // The start this stop was queued behind did not reach Monitoring
            MonitoringState::Idle | MonitoringState::Failed | MonitoringState::Starting => {
                debug!(id, state = %current, "Stop is a no-op");
                self.settle(id, Ok(()));
            }
        }
    }

    /// Handle a request to drop some regions from the session
    async fn remove(&mut self, mut ids: Vec<String>, request: PendingRequest) {
        let id = self.dispatcher.track(request);

        let state = self.shared.state();
        if state != MonitoringState::Monitoring {
            debug!(id, %state, "Region removal is a no-op, not monitoring");
            self.settle(id, Ok(()));
            return;
        }

        ids.retain(|region_id| self.store.contains(region_id));
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            debug!(id, "Region removal is a no-op, no known regions");
            self.settle(id, Ok(()));
            return;
        }

        match self.platform.end_watching_regions(&ids).await {
            Ok(()) => {
                let removed = self.store.remove(&ids);
                for region in &removed {
                    self.debouncer.forget(&region.id);
                }
                info!(id, removed = removed.len(), remaining = self.store.len(), "Regions removed");
                self.settle(id, Ok(()));
            }
            Err(e) => {
                let e = Error::from(e);
                error!(id, kind = %e.kind(), "Failed to remove regions: {}", e);
                self.settle(id, Err(e));
            }
        }
    }

    fn settle(&mut self, id: u64, outcome: Result<()>) {
        if let Err(e) = self.dispatcher.resolve_pending(id, outcome) {
            warn!(id, "Settlement ignored: {}", e);
        }
    }

    /// Filter, debounce and dispatch one transition
    fn handle_transition(&mut self, raw: RawTransition, source: EventSource) {
        let state = self.shared.state();
        if state != MonitoringState::Monitoring {
            debug!(region_id = %raw.region_id, kind = %raw.kind, %state, "Discarding transition, not monitoring");
            self.shared.diagnostics.record_discarded_inactive();
            return;
        }

        let Ok(region) = self.store.get(&raw.region_id) else {
            warn!(region_id = %raw.region_id, "Discarding transition for unknown region");
            self.shared.diagnostics.record_discarded_unknown_region();
            return;
        };

        if self.store.is_expired(&raw.region_id, raw.observed_at) {
            debug!(region_id = %raw.region_id, kind = %raw.kind, "Discarding transition for expired region");
            self.shared.diagnostics.record_discarded_expired();
            return;
        }

        match self.debouncer.check(&raw.region_id, raw.kind, raw.observed_at) {
            Verdict::Accepted => {}
            Verdict::Repeated => {
                debug!(region_id = %raw.region_id, kind = %raw.kind, "Suppressed repeated transition");
                self.shared.diagnostics.record_suppressed_repeat();
                return;
            }
            Verdict::Stale => {
                debug!(region_id = %raw.region_id, kind = %raw.kind, "Dropped stale transition");
                self.shared.diagnostics.record_dropped_stale();
                return;
            }
        }

        if !region.transitions.allows(raw.kind) {
            debug!(region_id = %raw.region_id, kind = %raw.kind, "Region does not report this transition");
            self.shared.diagnostics.record_filtered_by_region();
            return;
        }

        let event = TransitionEvent {
            region_id: raw.region_id,
            kind: raw.kind,
            observed_at: raw.observed_at,
            timestamp: raw.timestamp,
            source,
        };

        info!(region_id = %event.region_id, kind = %event.kind, ?source, "Geofence transition");
        self.dispatcher.dispatch_transition(&event, region, &self.handle);
    }

    /// End the session and fail everything still waiting
    async fn shutdown(&mut self) {
        let state = self.shared.state();
        if matches!(
            state,
            MonitoringState::Monitoring | MonitoringState::Starting | MonitoringState::Stopping
        ) {
            self.platform.end_watching().await;
        }
        self.store.clear();
        self.debouncer.reset();

        self.close_queue();
        self.dispatcher.reject_all("engine stopped");
    }

    /// Refuse further commands and reject the ones still queued
    ///
    /// Handles may have pre-set `Starting` or `Stopping` for a queued
    /// command, so the state is reset only after the queue is empty.
    fn close_queue(&mut self) {
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            command.reject(Error::engine_unavailable("engine stopped"));
        }
        self.shared.reset();
    }
}

impl Drop for GeofenceEngine {
    fn drop(&mut self) {
        self.close_queue();
    }
}
