// # Management Trait
//
// The capability set handed to the host application. `GeofenceHandle` is
// the only production implementation; tests may substitute their own.

use crate::dispatch::PendingOperation;
use crate::model::Region;

/// Start/stop control plus custom event emission
///
/// All methods return immediately. Start and stop hand back a
/// [`PendingOperation`] that resolves once the platform call completes.
pub trait GeofenceManagement: Send + Sync {
    /// Begin monitoring `regions`
    ///
    /// Rejects with `ALREADY_ACTIVE` while a session is starting or running.
    fn start_monitoring(&self, regions: Vec<Region>) -> PendingOperation;

    /// Stop monitoring. Idempotent: resolves successfully when idle.
    fn stop_monitoring(&self) -> PendingOperation;

    /// Fire a named event with a payload to the registered delegate
    fn send_event(&self, name: &str, body: serde_json::Map<String, serde_json::Value>);

    /// Fire a named event without payload to the registered delegate
    fn add_custom_event(&self, event_name: &str);
}
