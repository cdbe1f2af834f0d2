//! Event dispatcher
//!
//! Delivers accepted transitions and custom events to the single
//! registered delegate and settles pending start/stop requests.
//!
//! ## Delivery
//!
//! Delivery is synchronous and unqueued: if no delegate is registered (or
//! the host already dropped it) the event is discarded and counted in
//! [`Diagnostics`]. Nothing is retained after the call returns.
//!
//! ## Settlement
//!
//! Every tracked request is settled exactly once. Settling an id that is no
//! longer pending is a programming error: it panics in debug builds and is
//! logged and ignored in release builds.

pub mod pending;

pub use pending::{
    OperationKind, PendingOperation, PendingRequest, RequestId, ResolutionState,
};

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::model::{CustomEvent, GeofenceEventModel, Region, TransitionEvent};
use crate::traits::{GeofenceDelegate, GeofenceManagement};

/// Delegate slot plus the table of in-flight requests
pub struct Dispatcher {
    delegate: Option<Weak<dyn GeofenceDelegate>>,
    pending: HashMap<RequestId, PendingRequest>,
    diagnostics: Arc<Diagnostics>,
}

impl Dispatcher {
    /// Create a dispatcher with no delegate
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            delegate: None,
            pending: HashMap::new(),
            diagnostics,
        }
    }

    /// Store a weak reference to `delegate`, replacing any previous one
    pub fn set_delegate(&mut self, delegate: &Arc<dyn GeofenceDelegate>) {
        if self.delegate.take().is_some() {
            debug!("Replacing registered delegate");
        }
        self.delegate = Some(Arc::downgrade(delegate));
    }

    /// Empty the delegate slot
    pub fn clear_delegate(&mut self) {
        self.delegate = None;
    }

    /// Whether a live delegate is registered
    pub fn has_delegate(&self) -> bool {
        self.live_delegate().is_some()
    }

    fn live_delegate(&self) -> Option<Arc<dyn GeofenceDelegate>> {
        self.delegate.as_ref().and_then(|weak| weak.upgrade())
    }

    /// Deliver an accepted transition
    pub fn dispatch_transition(
        &self,
        event: &TransitionEvent,
        region: &Region,
        manager: &dyn GeofenceManagement,
    ) {
        let Some(delegate) = self.live_delegate() else {
            debug!(region_id = %event.region_id, kind = %event.kind, "No delegate, dropping transition");
            self.diagnostics.record_dropped_no_delegate();
            return;
        };

        let model = GeofenceEventModel::from_transition(event, region);
        delegate.geofence_event(&model, manager);
        self.diagnostics.record_dispatched_transition();
    }

    /// Deliver a custom event
    pub fn dispatch_custom_event(&self, event: &CustomEvent, manager: &dyn GeofenceManagement) {
        let Some(delegate) = self.live_delegate() else {
            debug!(name = %event.name, "No delegate, dropping custom event");
            self.diagnostics.record_dropped_no_delegate();
            return;
        };

        delegate.custom_event(event, manager);
        self.diagnostics.record_dispatched_custom_event();
    }

    /// Fire the initialization callback on the current delegate
    pub fn notify_init(&self, manager: &dyn GeofenceManagement) {
        if let Some(delegate) = self.live_delegate() {
            delegate.on_init_geofences_module(manager);
        }
    }

    /// Take ownership of a request until it is settled
    pub fn track(&mut self, request: PendingRequest) -> RequestId {
        let id = request.id();
        self.pending.insert(id, request);
        id
    }

    /// Number of requests awaiting settlement
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Settle one tracked request
    ///
    /// # Panics
    ///
    /// In debug builds, if `id` is not pending (already settled or never
    /// tracked).
    pub fn resolve_pending(&mut self, id: RequestId, outcome: Result<()>) -> Result<ResolutionState> {
        match self.pending.remove(&id) {
            Some(request) => {
                let kind = request.kind();
                let state = request.settle(outcome);
                debug!(id, %kind, ?state, "Settled pending request");
                Ok(state)
            }
            None => {
                self.diagnostics.record_double_resolution();
                if cfg!(debug_assertions) {
                    panic!("pending request {id} settled twice");
                }
                warn!(id, "Ignoring second settlement of pending request");
                Err(Error::DoubleResolution(id))
            }
        }
    }

    /// Reject every request still pending
    pub fn reject_all(&mut self, reason: &str) {
        for (id, request) in self.pending.drain() {
            debug!(id, kind = %request.kind(), reason, "Rejecting pending request");
            request.reject(Error::engine_unavailable(reason.to_string()));
        }
    }
}
