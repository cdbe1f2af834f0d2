//! Minimal embedding example for geofence-core
//!
//! An application brings its own `PlatformMonitor`, registers a delegate
//! and drives the engine lifecycle itself. The delegate reacts to an exit
//! by asking for a custom event, showing that callbacks may call back
//! into the manager.

use geofence_core::{
    CustomEvent, EngineConfig, GeofenceDelegate, GeofenceEngine, GeofenceEventModel,
    GeofenceManagement, PlatformError, PlatformMonitor, RawTransition, Region, TransitionKind,
};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// In-process platform fed by the application
struct EmbeddedPlatform {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<RawTransition>>>,
}

impl EmbeddedPlatform {
    fn new() -> (Self, mpsc::UnboundedSender<RawTransition>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                receiver: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait::async_trait]
impl PlatformMonitor for EmbeddedPlatform {
    async fn begin_watching(&self, regions: &[Region]) -> Result<(), PlatformError> {
        println!("[Embedded] Watching {} region(s)", regions.len());
        Ok(())
    }

    async fn end_watching(&self) {
        println!("[Embedded] Stopped watching");
    }

    async fn end_watching_regions(&self, region_ids: &[String]) -> Result<(), PlatformError> {
        println!("[Embedded] Stopped watching {}", region_ids.join(", "));
        Ok(())
    }

    fn transitions(&self) -> Pin<Box<dyn Stream<Item = RawTransition> + Send + 'static>> {
        match self.receiver.lock().ok().and_then(|mut rx| rx.take()) {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::empty()),
        }
    }

    fn platform_name(&self) -> &'static str {
        "embedded"
    }
}

/// Prints events and announces departures
struct PrintingDelegate;

impl GeofenceDelegate for PrintingDelegate {
    fn geofence_event(&self, event: &GeofenceEventModel, manager: &dyn GeofenceManagement) {
        println!(
            "[Embedded] {} {} ({})",
            event.kind, event.name, event.region_id
        );
        if event.kind == TransitionKind::Exit {
            let mut body = serde_json::Map::new();
            body.insert("left".to_string(), serde_json::json!(event.region_id));
            manager.send_event("departure", body);
        }
    }

    fn custom_event(&self, event: &CustomEvent, _manager: &dyn GeofenceManagement) {
        println!(
            "[Embedded] custom event '{}' {}",
            event.name,
            serde_json::Value::Object(event.payload.clone())
        );
    }
}

#[tokio::main]
async fn main() -> geofence_core::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let (platform, feed) = EmbeddedPlatform::new();
    let config = EngineConfig::default().with_dwell_interval(Duration::from_secs(1));
    let (engine, handle) = GeofenceEngine::new(Box::new(platform), config)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_task = tokio::spawn(engine.run_with_shutdown(Some(shutdown_rx)));

    let delegate: Arc<dyn GeofenceDelegate> = Arc::new(PrintingDelegate);
    handle.register_delegate(delegate.clone())?;

    let regions = vec![
        Region::new("home", 52.5200, 13.4050, 150.0).with_name("Home"),
        Region::new("office", 52.5310, 13.3840, 200.0)
            .with_name("Office")
            .with_metadata("floor", "3"),
    ];
    handle.start_monitoring(regions).await?;

    // A noisy platform: the second ENTER is suppressed by the debouncer
    for (id, kind) in [
        ("home", TransitionKind::Exit),
        ("office", TransitionKind::Enter),
        ("office", TransitionKind::Enter),
    ] {
        let _ = feed.send(RawTransition::now(id, kind));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let diagnostics = handle.diagnostics();
    println!(
        "[Embedded] dispatched={} suppressed={}",
        diagnostics.dispatched_transitions, diagnostics.suppressed_repeats
    );

    // Leaving the office for good: stop watching it, keep home
    handle.remove_regions(&["office"]).await?;
    println!("[Embedded] still watching: {:?}", handle.regions().await?);

    handle.stop_monitoring().await?;
    let _ = shutdown_tx.send(());
    let _ = engine_task.await;
    Ok(())
}
