//! Diagnostic counters
//!
//! Silent drops (debounced repeats, missing delegate, inactive engine) are
//! never reported as errors. They are only observable here.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters, updated by the engine task and read by anyone
#[derive(Debug, Default)]
pub struct Diagnostics {
    dropped_no_delegate: AtomicU64,
    suppressed_repeats: AtomicU64,
    dropped_stale: AtomicU64,
    discarded_inactive: AtomicU64,
    discarded_unknown_region: AtomicU64,
    discarded_expired: AtomicU64,
    filtered_by_region: AtomicU64,
    dispatched_transitions: AtomicU64,
    dispatched_custom_events: AtomicU64,
    double_resolutions: AtomicU64,
    rejected_commands: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    /// Events dropped because no delegate was registered (or it was gone)
    pub dropped_no_delegate: u64,
    /// Same-kind transitions inside the dwell window
    pub suppressed_repeats: u64,
    /// Transitions older than the last accepted one for their region
    pub dropped_stale: u64,
    /// Transitions that arrived outside the `Monitoring` state
    pub discarded_inactive: u64,
    /// Transitions for ids not in the region store
    pub discarded_unknown_region: u64,
    /// Transitions for regions past their expiry
    pub discarded_expired: u64,
    /// Transitions of a kind the region did not subscribe to
    pub filtered_by_region: u64,
    /// Transitions delivered to the delegate
    pub dispatched_transitions: u64,
    /// Custom events delivered to the delegate
    pub dispatched_custom_events: u64,
    /// Requests resolved more than once
    pub double_resolutions: u64,
    /// Commands refused because the engine queue was full or closed
    pub rejected_commands: u64,
}

macro_rules! counter {
    ($record:ident, $field:ident) => {
        pub fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_dropped_no_delegate, dropped_no_delegate);
    counter!(record_suppressed_repeat, suppressed_repeats);
    counter!(record_dropped_stale, dropped_stale);
    counter!(record_discarded_inactive, discarded_inactive);
    counter!(record_discarded_unknown_region, discarded_unknown_region);
    counter!(record_discarded_expired, discarded_expired);
    counter!(record_filtered_by_region, filtered_by_region);
    counter!(record_dispatched_transition, dispatched_transitions);
    counter!(record_dispatched_custom_event, dispatched_custom_events);
    counter!(record_double_resolution, double_resolutions);
    counter!(record_rejected_command, rejected_commands);

    /// Read every counter
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            dropped_no_delegate: self.dropped_no_delegate.load(Ordering::Relaxed),
            suppressed_repeats: self.suppressed_repeats.load(Ordering::Relaxed),
            dropped_stale: self.dropped_stale.load(Ordering::Relaxed),
            discarded_inactive: self.discarded_inactive.load(Ordering::Relaxed),
            discarded_unknown_region: self.discarded_unknown_region.load(Ordering::Relaxed),
            discarded_expired: self.discarded_expired.load(Ordering::Relaxed),
            filtered_by_region: self.filtered_by_region.load(Ordering::Relaxed),
            dispatched_transitions: self.dispatched_transitions.load(Ordering::Relaxed),
            dispatched_custom_events: self.dispatched_custom_events.load(Ordering::Relaxed),
            double_resolutions: self.double_resolutions.load(Ordering::Relaxed),
            rejected_commands: self.rejected_commands.load(Ordering::Relaxed),
        }
    }
}
