//! Run command implementation

use crate::alert::{AlertThrottle, TerminalBell, ToneSink};
use crate::api::{create_router, AppState};
use crate::capture::{CameraType, CaptureAdapter};
use crate::cli::RunArgs;
use crate::config::MonitorConfig;
use crate::connection::{ConnectionHandle, ConnectionManager, ConnectionState};
use crate::history::{HistoryLog, JsonFileStore};
use crate::pipeline::{Pipeline, PipelineHandle};
use crate::settings::UserSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &RunArgs,
) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        MonitorConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        MonitorConfig::default()
    };

    config = config.with_env_overrides();

    // CLI overrides (highest priority)
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref url) = args.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(ref dir) = args.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.no_auto_connect {
        config.backend.auto_connect = false;
    }
    if args.no_server {
        config.server.enabled = false;
    }

    Ok(config)
}

/// User settings from the data directory, falling back to config defaults.
///
/// `image` replaces the camera for this run only; it is not persisted
/// unless the settings are later saved from the dashboard.
pub fn load_settings(config: &MonitorConfig, image: Option<&PathBuf>) -> UserSettings {
    let defaults = UserSettings::from_config(config);
    let path = config.storage.settings_path();

    let mut settings = match UserSettings::load(&path, &defaults) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Ignoring unreadable settings file, using defaults"
            );
            defaults
        }
    };

    if let Some(image) = image {
        settings.camera.camera_type = CameraType::File;
        settings.camera.file_path = Some(image.clone());
    }
    settings
}

/// Running connection manager and pipeline tasks.
pub struct Monitor {
    pub pipeline: PipelineHandle,
    pub connection: ConnectionHandle,
    manager_task: JoinHandle<()>,
    pipeline_task: JoinHandle<()>,
}

impl Monitor {
    /// Wait for both tasks to finish (after cancellation).
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.pipeline_task.await?;
        self.manager_task.await?;
        Ok(())
    }
}

/// Build and start the connection manager and the detection pipeline.
///
/// Does not connect; call [`ConnectionHandle::connect`] on the result.
pub fn spawn_monitor(
    config: &MonitorConfig,
    settings: UserSettings,
    sink: Box<dyn ToneSink>,
    cancel_token: CancellationToken,
) -> Result<Monitor, Box<dyn std::error::Error>> {
    let (manager, connection, events) = ConnectionManager::new(config.backend.clone())?;
    tracing::info!(endpoint = %manager.endpoint(), "Detection backend");
    let manager_task = manager.start(cancel_token.clone());

    let capture = CaptureAdapter::from_config(&settings.camera)?;
    let store = JsonFileStore::new(config.storage.history_path());
    tracing::info!(path = %store.path().display(), "Detection history");
    let history = HistoryLog::open(Box::new(store), settings.history.max_records);
    let throttle = AlertThrottle::new(sink);

    let (pipeline, handle) = Pipeline::new(
        config.detection.clone(),
        settings,
        capture,
        history,
        throttle,
        connection.clone(),
        events,
    );
    let pipeline_task = pipeline
        .with_settings_path(config.storage.settings_path())
        .with_payload_logging(config.logging.log_payloads)
        .start(cancel_token);

    Ok(Monitor {
        pipeline: handle,
        connection,
        manager_task,
        pipeline_task,
    })
}

/// Start detection the first time the backend connects.
pub async fn start_when_connected(
    pipeline: PipelineHandle,
    connection: ConnectionHandle,
    cancel_token: CancellationToken,
) {
    let mut state = connection.subscribe();
    while *state.borrow_and_update() != ConnectionState::Connected {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }

    match pipeline.start().await {
        Ok(()) => tracing::info!("Detection started"),
        Err(e) => tracing::warn!(error = %e, "Could not start detection"),
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
        _ = cancel_token.cancelled() => {}
    }

    cancel_token.cancel();
}

/// Main run command handler
pub async fn run_monitor(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load and merge configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Initialize tracing and metrics
    crate::logging::init_tracing(&config.logging)?;
    let prometheus = crate::metrics::prometheus_handle();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting PPE monitor");
    tracing::debug!(?config, "Loaded configuration");

    // 3. User settings and pipeline
    let settings = load_settings(&config, args.image.as_ref());
    let cancel_token = CancellationToken::new();
    let monitor = spawn_monitor(
        &config,
        settings,
        Box::new(TerminalBell),
        cancel_token.clone(),
    )?;

    if config.backend.auto_connect {
        monitor.connection.connect()?;
    } else {
        tracing::info!("Auto-connect disabled; connect is left to the operator");
    }

    if args.start {
        tokio::spawn(start_when_connected(
            monitor.pipeline.clone(),
            monitor.connection.clone(),
            cancel_token.clone(),
        ));
    }

    // 4. Serve the dashboard until shutdown
    if config.server.enabled {
        let config = Arc::new(config);
        let state = Arc::new(
            AppState::new(
                monitor.pipeline.clone(),
                monitor.connection.clone(),
                Arc::clone(&config),
            )
            .with_prometheus(prometheus),
        );
        let app = create_router(state);

        let addr = config.server.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "Dashboard listening");

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
            .await;
        cancel_token.cancel();
        served?;
    } else {
        tracing::info!("Dashboard disabled");
        shutdown_signal(cancel_token.clone()).await;
    }

    // 5. Cleanup
    tracing::info!("Waiting for pipeline and connection to stop");
    monitor.join().await?;

    tracing::info!("PPE monitor stopped");
    Ok(())
}
