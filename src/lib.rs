pub mod controller;
pub mod errors;
pub mod line_buffer;
pub mod models;
pub mod scheduler;
pub mod settings;
pub mod source;
pub mod store;
pub mod workspace;

pub use controller::{AtlasCore, CoreListener, NoopListener};
pub use errors::{AppError, AppResult};
pub use models::{CloseAction, CloseOutcome, Record, ReloadOutcome, SaveOutcome, SearchField, WorkspaceKey};
pub use scheduler::{ReloadScheduler, TickCallback};
pub use settings::AppSettings;
pub use source::{parse_points, DataSource, FetchFuture, HttpDataSource, ParsedPoints};
pub use store::RecordStore;
pub use workspace::{SharedStore, WorkspaceRegistry};

use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Sets up logging and settings under `app_data_dir` and builds the core
/// the desktop shell talks to.
pub fn bootstrap(app_data_dir: &Path, listener: Arc<dyn CoreListener>) -> AppResult<Arc<AtlasCore>> {
    std::fs::create_dir_all(app_data_dir)?;
    if let Err(error) = init_tracing(app_data_dir) {
        eprintln!("failed to initialize logging: {}", error);
    }
    let settings = AppSettings::load(app_data_dir)?;
    tracing::info!(
        endpoint = %settings.endpoint_url,
        interval_ms = settings.reload_interval_ms,
        capacity = settings.timer_capacity,
        "atlas core starting"
    );
    AtlasCore::new(settings, listener)
}

/// Routes `tracing` output as JSON lines into a daily `logs/atlas.log`
/// under `app_data_dir`. `RUST_LOG` overrides the `info` default; a second
/// call fails because the global subscriber is already set.
pub fn init_tracing(app_data_dir: &Path) -> AppResult<()> {
    let log_dir = app_data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "atlas.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
