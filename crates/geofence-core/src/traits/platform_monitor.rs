// # Platform Monitor Trait
//
// Defines the boundary to the operating system's region-monitoring
// capability.
//
// ## Implementations
//
// - Simulated: `geofence-platform-sim` crate
// - Future: CoreLocation, Google Play geofencing client
//
// ## Usage
//
// ```rust,ignore
// use geofence_core::PlatformMonitor;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let monitor = /* PlatformMonitor implementation */;
//
//     let mut transitions = monitor.transitions();
//     monitor.begin_watching(&regions).await?;
//
//     while let Some(raw) = transitions.next().await {
//         println!("{} {}", raw.kind, raw.region_id);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::pin::Pin;
use std::time::Instant;
use tokio_stream::Stream;

use crate::error::PlatformError;
use crate::model::{Region, TransitionKind};

/// A physical crossing reported by the platform, before debouncing
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransition {
    /// Identifier of the region that was crossed
    pub region_id: String,
    /// Direction of the crossing
    pub kind: TransitionKind,
    /// Monotonic time of detection
    pub observed_at: Instant,
    /// Wall clock time of detection
    pub timestamp: DateTime<Utc>,
}

impl RawTransition {
    /// Create a raw transition stamped with the current time
    ///
    /// This constructor is public for use in:
    /// - `PlatformMonitor` implementations
    /// - Contract tests within geofence-core
    pub fn now(region_id: impl Into<String>, kind: TransitionKind) -> Self {
        Self {
            region_id: region_id.into(),
            kind,
            observed_at: Instant::now(),
            timestamp: Utc::now(),
        }
    }

    /// Create a raw transition with an explicit monotonic timestamp
    pub fn at(region_id: impl Into<String>, kind: TransitionKind, observed_at: Instant) -> Self {
        Self {
            region_id: region_id.into(),
            kind,
            observed_at,
            timestamp: Utc::now(),
        }
    }
}

/// Trait for platform region monitors
///
/// The engine consumes this capability; it never reimplements it.
///
/// # Responsibilities
///
/// - ✅ Register regions with the OS and report crossings
/// - ✅ Queue crossings while the host is suspended (OS responsibility)
/// - ❌ Debounce or filter transitions (owned by `Debouncer`)
/// - ❌ Track monitoring state (owned by `GeofenceEngine`)
/// - ❌ Retry failed registrations; fail explicitly instead
///
/// A call that never completes leaves the engine in `Starting` or
/// `Stopping`. Implementations must fail explicitly rather than hang.
#[async_trait]
pub trait PlatformMonitor: Send + Sync {
    /// Register the regions with the OS and start reporting crossings
    ///
    /// # Returns
    ///
    /// - `Ok(())`: All regions are being watched
    /// - `Err(PlatformError)`: Permission, limit or hardware failure
    async fn begin_watching(&self, regions: &[Region]) -> Result<(), PlatformError>;

    /// Unregister every region
    async fn end_watching(&self);

    /// Unregister some regions and keep watching the rest
    ///
    /// Only ids previously passed to `begin_watching` are given. On error
    /// the engine keeps the regions registered on its side.
    async fn end_watching_regions(&self, region_ids: &[String]) -> Result<(), PlatformError>;

    /// Stream of raw crossings
    ///
    /// Called once when the engine starts running. The stream stays open
    /// across start/stop cycles; the engine discards crossings that arrive
    /// while it is not monitoring.
    fn transitions(&self) -> Pin<Box<dyn Stream<Item = RawTransition> + Send + 'static>>;

    /// Maximum number of regions watched at once, if the platform has one
    fn max_regions(&self) -> Option<usize> {
        None
    }

    /// Platform name (for logging)
    fn platform_name(&self) -> &'static str;
}
