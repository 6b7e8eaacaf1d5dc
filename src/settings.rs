use crate::errors::{AppError, AppResult};
use crate::scheduler::{DEFAULT_RELOAD_INTERVAL, DEFAULT_TIMER_CAPACITY};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_ENDPOINT_URL: &str =
    "http://daily.digpro.se/bios/servlet/bios.servlets.web.RecruitmentTestServlet";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub endpoint_url: String,
    pub reload_interval_ms: u64,
    pub timer_capacity: usize,
    pub request_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            reload_interval_ms: DEFAULT_RELOAD_INTERVAL.as_millis() as u64,
            timer_capacity: DEFAULT_TIMER_CAPACITY,
            request_timeout_secs: 10,
        }
    }
}

impl AppSettings {
    /// Reads `settings.json` from `app_data_dir`. A missing or unreadable
    /// file falls back to defaults; invalid values are an error.
    pub fn load(app_data_dir: &Path) -> AppResult<Self> {
        let path = app_data_dir.join(SETTINGS_FILE);
        if !path.exists() {
            tracing::info!(path = %path.to_string_lossy(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let settings = match read_json_file::<Self>(&path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %error, "invalid settings file, using defaults");
                Self::default()
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, app_data_dir: &Path) -> AppResult<()> {
        self.validate()?;
        write_json_file(&app_data_dir.join(SETTINGS_FILE), self)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.endpoint_url.trim().is_empty() {
            return Err(AppError::Config("endpointUrl cannot be empty".to_string()));
        }
        if self.reload_interval_ms == 0 {
            return Err(AppError::Config("reloadIntervalMs must be positive".to_string()));
        }
        if self.timer_capacity == 0 {
            return Err(AppError::Config("timerCapacity must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config("requestTimeoutSecs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes).map_err(|error| AppError::Io(error.to_string()))
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let bytes = fs::read(path).map_err(|error| AppError::Io(error.to_string()))?;
    serde_json::from_slice(&bytes).map_err(AppError::from)
}
