//! Host-facing handle to a running engine
//!
//! The handle never blocks: every call does a short state check under the
//! shared lock and enqueues a command for the engine task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::MonitoringState;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::dispatch::{OperationKind, PendingOperation, PendingRequest};
use crate::error::{Error, Result};
use crate::model::{CustomEvent, Region, TransitionKind};
use crate::traits::{GeofenceDelegate, GeofenceManagement};

/// Work items processed by the engine task, in arrival order
pub(crate) enum Command {
    Start {
        regions: Vec<Region>,
        request: PendingRequest,
    },
    Stop {
        request: PendingRequest,
    },
    Remove {
        ids: Vec<String>,
        request: PendingRequest,
    },
    Custom(CustomEvent),
    Synthetic {
        region_id: String,
        kind: TransitionKind,
    },
    RegisterDelegate(Arc<dyn GeofenceDelegate>),
    ClearDelegate,
    Query(Query),
}

/// Read-only questions about the region store
pub(crate) enum Query {
    ContainsRegion {
        ids: Vec<String>,
        reply: oneshot::Sender<bool>,
    },
    RegionAt {
        latitude: f64,
        longitude: f64,
        radius: Option<f64>,
        reply: oneshot::Sender<Option<Region>>,
    },
    Regions {
        reply: oneshot::Sender<Vec<Region>>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Stop { .. } => "stop",
            Command::Remove { .. } => "remove_regions",
            Command::Custom(_) => "custom_event",
            Command::Synthetic { .. } => "synthetic_transition",
            Command::RegisterDelegate(_) => "register_delegate",
            Command::ClearDelegate => "clear_delegate",
            Command::Query(_) => "query",
        }
    }

    /// Reject whatever request the command carries
    pub(crate) fn reject(self, error: Error) {
        match self {
            Command::Start { request, .. }
            | Command::Stop { request }
            | Command::Remove { request, .. } => {
                request.reject(error);
            }
            _ => {}
        }
    }
}

/// Session state as seen by handles
#[derive(Debug, Clone, Copy)]
pub(crate) struct Gate {
    pub(crate) state: MonitoringState,
    /// A start was accepted while `Stopping` and has not reached the engine
    pub(crate) start_queued: bool,
}

/// State shared between the engine task and every handle
pub(crate) struct Shared {
    gate: Mutex<Gate>,
    next_request_id: AtomicU64,
    pub(crate) diagnostics: Arc<Diagnostics>,
}

impl Shared {
    pub(crate) fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            gate: Mutex::new(Gate {
                state: MonitoringState::Idle,
                start_queued: false,
            }),
            next_request_id: AtomicU64::new(1),
            diagnostics,
        }
    }

    pub(crate) fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> MonitoringState {
        self.lock_gate().state
    }

    pub(crate) fn set_state(&self, next: MonitoringState) -> MonitoringState {
        let mut gate = self.lock_gate();
        let previous = gate.state;
        gate.state = next;
        if previous != next {
            debug!(%previous, %next, "Monitoring state changed");
        }
        previous
    }

    /// Back to `Idle` with nothing queued
    pub(crate) fn reset(&self) {
        let mut gate = self.lock_gate();
        if gate.state != MonitoringState::Idle || gate.start_queued {
            debug!(previous = %gate.state, "Monitoring state reset");
        }
        gate.state = MonitoringState::Idle;
        gate.start_queued = false;
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Cloneable control handle implementing [`GeofenceManagement`]
#[derive(Clone)]
pub struct GeofenceHandle {
    commands: mpsc::Sender<Command>,
    shared: Arc<Shared>,
}

impl GeofenceHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, shared: Arc<Shared>) -> Self {
        Self { commands, shared }
    }

    /// Current state of the monitoring session
    pub fn state(&self) -> MonitoringState {
        self.shared.state()
    }

    /// Whether regions are being watched right now
    pub fn is_monitoring(&self) -> bool {
        self.state() == MonitoringState::Monitoring
    }

    /// Read the diagnostic counters
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// Register the delegate, replacing any previous one
    ///
    /// The engine keeps only a weak reference: the caller must hold on to
    /// `delegate` for as long as it wants events. `on_init_geofences_module`
    /// fires once the engine task processes the registration.
    pub fn register_delegate(&self, delegate: Arc<dyn GeofenceDelegate>) -> Result<()> {
        self.enqueue(Command::RegisterDelegate(delegate))
    }

    /// Empty the delegate slot
    pub fn clear_delegate(&self) -> Result<()> {
        self.enqueue(Command::ClearDelegate)
    }

    /// Feed a transition that did not come from the platform
    ///
    /// It goes through the same state check, filtering and debouncing as a
    /// platform transition and is delivered with `source: synthetic`.
    pub fn inject_transition(&self, region_id: impl Into<String>, kind: TransitionKind) -> Result<()> {
        self.enqueue(Command::Synthetic {
            region_id: region_id.into(),
            kind,
        })
    }

    /// Stop watching some regions of the current session
    ///
    /// Unknown ids are skipped. Outside an active session this resolves
    /// without touching the platform. Removed regions lose their debounce
    /// history, so re-adding one later starts fresh.
    pub fn remove_regions<S: AsRef<str>>(&self, ids: &[S]) -> PendingOperation {
        let (request, operation) =
            PendingRequest::new(self.shared.next_id(), OperationKind::Remove);
        let ids = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.enqueue_request(Command::Remove { ids, request });
        operation
    }

    /// Whether a region with this id is in the current session
    pub async fn contains_region(&self, id: &str) -> Result<bool> {
        self.contains_any_region(&[id]).await
    }

    /// Whether any of the ids is in the current session
    pub async fn contains_any_region<S: AsRef<str>>(&self, ids: &[S]) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        let ids = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.enqueue(Command::Query(Query::ContainsRegion { ids, reply }))?;
        Self::await_reply(rx).await
    }

    /// Region centered on the given point; `None` radius matches any radius
    pub async fn region_at(
        &self,
        latitude: f64,
        longitude: f64,
        radius: Option<f64>,
    ) -> Result<Option<Region>> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::Query(Query::RegionAt {
            latitude,
            longitude,
            radius,
            reply,
        }))?;
        Self::await_reply(rx).await
    }

    /// Regions of the current session, sorted by id
    pub async fn regions(&self) -> Result<Vec<Region>> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::Query(Query::Regions { reply }))?;
        Self::await_reply(rx).await
    }

    async fn await_reply<T>(rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|_| Error::engine_unavailable("engine stopped before answering"))
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        let name = command.name();
        self.commands.try_send(command).map_err(|e| {
            self.shared.diagnostics.record_rejected_command();
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "command queue full",
                mpsc::error::TrySendError::Closed(_) => "engine stopped",
            };
            warn!(command = name, reason, "Engine refused command");
            Error::engine_unavailable(reason)
        })
    }

    /// Enqueue a command carrying a request, rejecting the request if refused
    fn enqueue_request(&self, command: Command) -> bool {
        let name = command.name();
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                self.shared.diagnostics.record_rejected_command();
                let (reason, command) = match e {
                    mpsc::error::TrySendError::Full(c) => ("command queue full", c),
                    mpsc::error::TrySendError::Closed(c) => ("engine stopped", c),
                };
                warn!(command = name, reason, "Engine refused command");
                command.reject(Error::engine_unavailable(reason));
                false
            }
        }
    }
}

impl GeofenceManagement for GeofenceHandle {
    fn start_monitoring(&self, regions: Vec<Region>) -> PendingOperation {
        let (request, operation) = PendingRequest::new(self.shared.next_id(), OperationKind::Start);

        let mut gate = self.shared.lock_gate();
        let previous = *gate;
        let active = match previous.state {
            _ if previous.start_queued => true,
            MonitoringState::Starting | MonitoringState::Monitoring => true,
            MonitoringState::Idle | MonitoringState::Failed => {
                gate.state = MonitoringState::Starting;
                false
            }
            // Applied by the engine once the stop ahead of it completes
            MonitoringState::Stopping => {
                gate.start_queued = true;
                false
            }
        };
        if active {
            drop(gate);
            let state = if previous.start_queued {
                MonitoringState::Starting
            } else {
                previous.state
            };
            debug!(%state, "Start rejected, session already active");
            request.reject(Error::already_active(state.to_string()));
            return operation;
        }

        if !self.enqueue_request(Command::Start { regions, request }) {
            *gate = previous;
        }
        operation
    }

    fn stop_monitoring(&self) -> PendingOperation {
        let (request, operation) = PendingRequest::new(self.shared.next_id(), OperationKind::Stop);

        let mut gate = self.shared.lock_gate();
        let previous = *gate;
        match previous.state {
            MonitoringState::Idle | MonitoringState::Failed if !previous.start_queued => {
                drop(gate);
                request.resolve();
                return operation;
            }
            MonitoringState::Monitoring => gate.state = MonitoringState::Stopping,
            // Queued behind the in-flight or queued start or stop
            _ => {}
        }

        if !self.enqueue_request(Command::Stop { request }) {
            *gate = previous;
        }
        operation
    }

    fn send_event(&self, name: &str, body: serde_json::Map<String, serde_json::Value>) {
        let _ = self.enqueue(Command::Custom(CustomEvent::new(name, body)));
    }

    fn add_custom_event(&self, event_name: &str) {
        let _ = self.enqueue(Command::Custom(CustomEvent::named(event_name)));
    }
}
