// # Delegate Trait
//
// The host application's observer. Exactly one delegate is registered at a
// time and the engine only keeps a weak reference to it.

use crate::model::{CustomEvent, GeofenceEventModel};
use crate::traits::GeofenceManagement;

/// Receiver of geofence and custom events
///
/// Callbacks run synchronously on the engine task. Keep them short; calls
/// back into `manager` are non-blocking and safe from inside a callback.
pub trait GeofenceDelegate: Send + Sync {
    /// An accepted geofence transition
    fn geofence_event(&self, event: &GeofenceEventModel, manager: &dyn GeofenceManagement);

    /// A custom event sent through [`GeofenceManagement::send_event`] or
    /// [`GeofenceManagement::add_custom_event`]
    fn custom_event(&self, event: &CustomEvent, manager: &dyn GeofenceManagement);

    /// Fired once per registration, before any monitoring call is expected
    fn on_init_geofences_module(&self, manager: &dyn GeofenceManagement) {
        let _ = manager;
    }
}
