// # geofenced - Geofence Daemon
//
// Thin integration layer around geofence-core. All monitoring, debouncing
// and dispatch logic lives in the library.
//
// The geofenced daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Creating the platform monitor and the engine
// 4. Starting monitoring for the configured regions
// 5. Stopping cleanly on SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Regions
// - `GEOFENCE_REGIONS_PATH`: JSON file with `regions` and optional `engine` settings (required)
//
// ### Simulated Platform
// - `GEOFENCE_SCRIPT_PATH`: JSON transition script to replay after start (optional)
// - `GEOFENCE_MAX_REGIONS`: Region limit advertised by the platform (optional)
// - `GEOFENCE_PERMISSION_GRANTED`: `true`/`false`, default `true`
//
// ### Engine
// - `GEOFENCE_DWELL_MS`: Overrides `engine.dwell_interval_ms` from the regions file
// - `GEOFENCE_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export GEOFENCE_REGIONS_PATH=/etc/geofence/regions.json
// export GEOFENCE_SCRIPT_PATH=/etc/geofence/commute.json
// export GEOFENCE_DWELL_MS=5000
//
// geofenced
// ```

use anyhow::Result;
use geofence_core::{
    CustomEvent, GeofenceConfig, GeofenceDelegate, GeofenceEngine, GeofenceEventModel,
    GeofenceManagement,
};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum GeofenceExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<GeofenceExitCode> for ExitCode {
    fn from(code: GeofenceExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// How long to wait for the engine task after shutdown is signalled
const ENGINE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Application configuration
struct Config {
    regions_path: PathBuf,
    script_path: Option<PathBuf>,
    dwell_ms: Option<u64>,
    max_regions: Option<usize>,
    permission_granted: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let regions_path = env::var("GEOFENCE_REGIONS_PATH").map_err(|_| {
            anyhow::anyhow!(
                "GEOFENCE_REGIONS_PATH is required. \
                Set it via: export GEOFENCE_REGIONS_PATH=/etc/geofence/regions.json"
            )
        })?;

        Ok(Self {
            regions_path: PathBuf::from(regions_path),
            script_path: env::var("GEOFENCE_SCRIPT_PATH").ok().map(PathBuf::from),
            dwell_ms: parse_var("GEOFENCE_DWELL_MS")?,
            max_regions: parse_var("GEOFENCE_MAX_REGIONS")?,
            permission_granted: parse_var("GEOFENCE_PERMISSION_GRANTED")?.unwrap_or(true),
            log_level: env::var("GEOFENCE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.regions_path.as_os_str().is_empty() {
            anyhow::bail!("GEOFENCE_REGIONS_PATH cannot be empty");
        }
        if !self.regions_path.exists() {
            anyhow::bail!(
                "GEOFENCE_REGIONS_PATH does not exist: {}",
                self.regions_path.display()
            );
        }

        if let Some(ref script) = self.script_path {
            if !script.exists() {
                anyhow::bail!("GEOFENCE_SCRIPT_PATH does not exist: {}", script.display());
            }
        }

        if let Some(dwell) = self.dwell_ms {
            if dwell > 86_400_000 {
                anyhow::bail!(
                    "GEOFENCE_DWELL_MS must be at most one day (86400000). Got: {}",
                    dwell
                );
            }
        }

        if self.max_regions == Some(0) {
            anyhow::bail!("GEOFENCE_MAX_REGIONS must be greater than 0");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GEOFENCE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

/// Delegate that writes every event to the log
struct LoggingDelegate;

impl GeofenceDelegate for LoggingDelegate {
    fn geofence_event(&self, event: &GeofenceEventModel, _manager: &dyn GeofenceManagement) {
        let body = serde_json::Value::Object(event.to_map());
        info!(region_id = %event.region_id, kind = %event.kind, "Geofence event: {}", body);
    }

    fn custom_event(&self, event: &CustomEvent, _manager: &dyn GeofenceManagement) {
        let payload = serde_json::Value::Object(event.payload.clone());
        info!(name = %event.name, "Custom event: {}", payload);
    }

    fn on_init_geofences_module(&self, manager: &dyn GeofenceManagement) {
        info!("Geofence module initialized");
        manager.add_custom_event("geofenced.ready");
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return GeofenceExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return GeofenceExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GeofenceExitCode::ConfigError.into();
    }

    info!("Starting geofenced daemon");

    // Load regions before entering the runtime so file errors are config errors
    let mut geofence_config = match GeofenceConfig::from_json_file(&config.regions_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load regions file: {}", e);
            return GeofenceExitCode::ConfigError.into();
        }
    };
    if let Some(dwell) = config.dwell_ms {
        geofence_config.engine.dwell_interval_ms = dwell;
    }
    info!(
        "Configuration loaded: {} region(s), dwell {:?}",
        geofence_config.regions.len(),
        geofence_config.engine.dwell_interval()
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GeofenceExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config, geofence_config).await {
            error!("Daemon error: {}", e);
            GeofenceExitCode::RuntimeError
        } else {
            GeofenceExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
#[cfg(feature = "sim")]
async fn run_daemon(config: Config, geofence_config: GeofenceConfig) -> Result<()> {
    use geofence_platform_sim::{SimulatedPlatform, SimulatorConfig, TransitionScript};

    let script = match config.script_path {
        Some(ref path) => Some(TransitionScript::from_json_file(path)?),
        None => None,
    };

    let (platform, control) = SimulatedPlatform::with_config(SimulatorConfig {
        permission_granted: config.permission_granted,
        max_regions: config.max_regions,
        ..Default::default()
    });

    let (engine, handle) = GeofenceEngine::new(Box::new(platform), geofence_config.engine)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_task = tokio::spawn(engine.run_with_shutdown(Some(shutdown_rx)));

    // The engine only holds a weak reference
    let delegate: Arc<dyn GeofenceDelegate> = Arc::new(LoggingDelegate);
    handle.register_delegate(delegate.clone())?;

    info!("Starting monitoring");
    if let Err(e) = handle.start_monitoring(geofence_config.regions).await {
        error!(kind = %e.kind(), "Failed to start monitoring: {}", e);
        let _ = shutdown_tx.send(());
        let _ = engine_task.await;
        return Err(e.into());
    }
    info!("Monitoring active");

    if let Some(script) = script {
        tokio::spawn(async move {
            match control.replay(&script).await {
                Ok(sent) => info!("Transition script finished: {} transition(s)", sent),
                Err(e) => warn!("Transition script aborted: {}", e),
            }
        });
    }

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);

    if let Err(e) = handle.stop_monitoring().await {
        warn!("Stop monitoring failed: {}", e);
    }

    match serde_json::to_string(&handle.diagnostics()) {
        Ok(json) => info!("Diagnostics: {}", json),
        Err(e) => warn!("Failed to encode diagnostics: {}", e),
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(ENGINE_SHUTDOWN_TIMEOUT, engine_task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => anyhow::bail!("Engine task panicked: {}", e),
        Err(_) => anyhow::bail!("Engine shutdown timeout after {:?}", ENGINE_SHUTDOWN_TIMEOUT),
    }

    drop(delegate);
    info!("Shutting down daemon");
    Ok(())
}

#[cfg(not(feature = "sim"))]
async fn run_daemon(_config: Config, _geofence_config: GeofenceConfig) -> Result<()> {
    anyhow::bail!("No platform monitor compiled in. Rebuild with the `sim` feature.")
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
