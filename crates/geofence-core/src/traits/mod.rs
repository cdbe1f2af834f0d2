//! Core traits for the geofence engine
//!
//! - [`PlatformMonitor`]: OS region-monitoring boundary
//! - [`GeofenceDelegate`]: host observer for transitions and custom events
//! - [`GeofenceManagement`]: control surface handed to the host

pub mod platform_monitor;
pub mod delegate;
pub mod management;

pub use platform_monitor::{PlatformMonitor, RawTransition};
pub use delegate::GeofenceDelegate;
pub use management::GeofenceManagement;
