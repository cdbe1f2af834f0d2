// # geofence-core
//
// Core library for geofence monitoring and event dispatch.
//
// ## Architecture Overview
//
// This library turns raw region-crossing reports from an OS location
// service into debounced, filtered events for a single host delegate:
// - **PlatformMonitor**: Trait for the OS region monitor (begin/end watching, transition stream)
// - **RegionStore**: Regions of the active monitoring session, keyed by id
// - **Debouncer**: Per-region duplicate suppression with a dwell interval
// - **Dispatcher**: Delivers events to the delegate and settles pending requests
// - **GeofenceEngine**: Actor that owns all of the above and drives the state machine
// - **GeofenceHandle**: Cloneable, non-blocking control surface for the host
//
// ## Design Principles
//
// 1. **Single Writer**: Only the engine task mutates session state
// 2. **Event-Driven**: Platform transitions arrive as an async stream
// 3. **Platform-Agnostic**: OS integrations live behind `PlatformMonitor`
// 4. **Library-First**: The daemon is a thin wrapper over this crate

#![deny(rustdoc::broken_intra_doc_links)]

pub mod traits;
pub mod model;
pub mod store;
pub mod debounce;
pub mod dispatch;
pub mod diagnostics;
pub mod engine;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{GeofenceDelegate, GeofenceManagement, PlatformMonitor, RawTransition};
pub use model::{Coordinate, CustomEvent, EventSource, GeofenceEventModel, Region, TransitionEvent, TransitionFilter, TransitionKind};
pub use store::RegionStore;
pub use debounce::{Debouncer, Verdict};
pub use dispatch::{Dispatcher, OperationKind, PendingOperation, PendingRequest, ResolutionState};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use engine::{GeofenceEngine, GeofenceHandle, MonitoringState};
pub use config::{EngineConfig, GeofenceConfig};
pub use error::{Error, ErrorKind, PlatformError, Result};
