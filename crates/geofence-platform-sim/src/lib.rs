// # Simulated Platform
//
// This crate provides a channel-driven region monitor for the geofence
// engine.
//
// ## Purpose
//
// A stand-in for the OS location service in:
// - Hosts without a real region-monitoring backend
// - CI/CD testing
// - Replaying recorded transition sequences while debugging
//
// ## Architecture
//
// `SimulatedPlatform` implements `PlatformMonitor` and is handed to the
// engine. The paired `SimulatorControl` stays with the caller and pushes
// raw transitions into the platform's stream, either one at a time or by
// replaying a JSON script.

use geofence_core::error::PlatformError;
use geofence_core::model::{Region, TransitionKind};
use geofence_core::traits::{PlatformMonitor, RawTransition};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Errors raised by the simulator controls
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The platform (and its transition stream) is gone
    #[error("Simulated platform disconnected")]
    Disconnected,

    #[error("Invalid script: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Behaviour knobs for the simulated platform
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// When false, `begin_watching` fails with `PermissionDenied`
    pub permission_granted: bool,

    /// When false, `begin_watching` fails with `HardwareUnavailable`
    pub hardware_available: bool,

    /// Advertised region limit
    pub max_regions: Option<usize>,

    /// Delay before `begin_watching` returns
    pub start_latency: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            permission_granted: true,
            hardware_available: true,
            max_regions: None,
            start_latency: Duration::ZERO,
        }
    }
}

/// State shared between the platform and its control
#[derive(Default)]
struct Watch {
    regions: Mutex<Vec<String>>,
    begin_calls: AtomicUsize,
    end_calls: AtomicUsize,
}

impl Watch {
    fn regions(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.regions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Channel-driven `PlatformMonitor`
pub struct SimulatedPlatform {
    config: SimulatorConfig,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<RawTransition>>>,
    watch: Arc<Watch>,
}

impl SimulatedPlatform {
    /// Create a platform with default behaviour
    pub fn new() -> (Self, SimulatorControl) {
        Self::with_config(SimulatorConfig::default())
    }

    /// Create a platform with the given behaviour
    pub fn with_config(config: SimulatorConfig) -> (Self, SimulatorControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch = Arc::new(Watch::default());

        let platform = Self {
            config,
            receiver: Mutex::new(Some(rx)),
            watch: watch.clone(),
        };
        let control = SimulatorControl { sender: tx, watch };

        (platform, control)
    }
}

#[async_trait::async_trait]
impl PlatformMonitor for SimulatedPlatform {
    async fn begin_watching(&self, regions: &[Region]) -> Result<(), PlatformError> {
        self.watch.begin_calls.fetch_add(1, Ordering::SeqCst);

        if !self.config.start_latency.is_zero() {
            tokio::time::sleep(self.config.start_latency).await;
        }

        if !self.config.permission_granted {
            return Err(PlatformError::permission_denied(
                "location permission not granted",
            ));
        }
        if !self.config.hardware_available {
            return Err(PlatformError::hardware_unavailable(
                "region monitoring not supported",
            ));
        }
        if let Some(limit) = self.config.max_regions {
            if regions.len() > limit {
                return Err(PlatformError::MonitoringLimitExceeded {
                    requested: regions.len(),
                    limit,
                });
            }
        }

        let mut watched = self.watch.regions();
        watched.clear();
        watched.extend(regions.iter().map(|r| r.id.clone()));

        tracing::info!(regions = watched.len(), "Simulated platform watching regions");
        Ok(())
    }

    async fn end_watching(&self) {
        self.watch.end_calls.fetch_add(1, Ordering::SeqCst);
        self.watch.regions().clear();
        tracing::info!("Simulated platform stopped watching");
    }

    async fn end_watching_regions(&self, region_ids: &[String]) -> Result<(), PlatformError> {
        let mut watched = self.watch.regions();
        watched.retain(|id| !region_ids.contains(id));
        tracing::info!(
            removed = region_ids.len(),
            remaining = watched.len(),
            "Simulated platform stopped watching some regions"
        );
        Ok(())
    }

    fn transitions(&self) -> Pin<Box<dyn Stream<Item = RawTransition> + Send + 'static>> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match receiver {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => {
                tracing::warn!("Transition stream already taken, returning an empty stream");
                Box::pin(tokio_stream::empty())
            }
        }
    }

    fn max_regions(&self) -> Option<usize> {
        self.config.max_regions
    }

    fn platform_name(&self) -> &'static str {
        "simulated"
    }
}

/// Caller-side handle that drives a [`SimulatedPlatform`]
#[derive(Clone)]
pub struct SimulatorControl {
    sender: mpsc::UnboundedSender<RawTransition>,
    watch: Arc<Watch>,
}

impl SimulatorControl {
    /// Report a crossing now
    ///
    /// The transition is sent even for regions that are not being watched,
    /// which lets tests exercise the engine's unknown-region path.
    pub fn emit(&self, region_id: impl Into<String>, kind: TransitionKind) -> Result<(), SimError> {
        self.emit_raw(RawTransition::now(region_id, kind))
    }

    /// Report a fully specified crossing
    pub fn emit_raw(&self, raw: RawTransition) -> Result<(), SimError> {
        tracing::debug!(region_id = %raw.region_id, kind = %raw.kind, "Simulated transition");
        self.sender.send(raw).map_err(|_| SimError::Disconnected)
    }

    /// Ids currently registered with the platform
    pub fn watched_regions(&self) -> Vec<String> {
        self.watch.regions().clone()
    }

    pub fn is_watching(&self, region_id: &str) -> bool {
        self.watch.regions().iter().any(|id| id == region_id)
    }

    /// Number of `begin_watching` calls so far
    pub fn begin_calls(&self) -> usize {
        self.watch.begin_calls.load(Ordering::SeqCst)
    }

    /// Number of `end_watching` calls so far
    pub fn end_calls(&self) -> usize {
        self.watch.end_calls.load(Ordering::SeqCst)
    }

    /// Emit every step of `script`, sleeping `delay_ms` before each
    ///
    /// Returns the number of transitions sent.
    pub async fn replay(&self, script: &TransitionScript) -> Result<usize, SimError> {
        tracing::info!(steps = script.steps.len(), "Replaying transition script");

        let mut sent = 0;
        for step in &script.steps {
            if step.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
            }
            self.emit(step.region_id.clone(), step.kind)?;
            sent += 1;
        }
        Ok(sent)
    }
}

/// One scripted crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub region_id: String,
    pub kind: TransitionKind,
    /// Wait before emitting this step
    #[serde(default)]
    pub delay_ms: u64,
}

/// Ordered list of crossings to replay
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionScript {
    pub steps: Vec<ScriptStep>,
}

impl TransitionScript {
    /// Parse a script from JSON
    ///
    /// Accepts either `{"steps": [...]}` or a bare array of steps.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let script = if value.is_array() {
            Self {
                steps: serde_json::from_value(value)?,
            }
        } else {
            serde_json::from_value(value)?
        };
        script.validate()?;
        Ok(script)
    }

    /// Load a script from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), SimError> {
        if let Some(index) = self.steps.iter().position(|s| s.region_id.is_empty()) {
            return Err(SimError::Script(format!("step {} has an empty region_id", index)));
        }
        Ok(())
    }
}
