use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

pub const MIN_POLL_INTERVAL_MS: u64 = 500;
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdbSettings {
    pub command_path: String,
    pub command_timeout_ms: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            command_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorSettings {
    pub thread_interval_ms: u64,
    pub camera_interval_ms: u64,
    pub lifecycle_interval_ms: u64,
    pub gfx_interval_ms: u64,
    pub fps_cache_max_idle_polls: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            thread_interval_ms: 2000,
            camera_interval_ms: 3000,
            lifecycle_interval_ms: 2000,
            gfx_interval_ms: 3000,
            fps_cache_max_idle_polls: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanionSettings {
    pub port: u16,
    pub connect_timeout_ms: u64,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            port: 8888,
            connect_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub companion: CompanionSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SOPHON_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sophon")
        .join("config.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

fn clamp_interval(value: u64, fallback: u64) -> u64 {
    if value == 0 {
        return fallback;
    }
    value.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS)
}

pub fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = MonitorSettings::default();
    config.monitor.thread_interval_ms =
        clamp_interval(config.monitor.thread_interval_ms, defaults.thread_interval_ms);
    config.monitor.camera_interval_ms =
        clamp_interval(config.monitor.camera_interval_ms, defaults.camera_interval_ms);
    config.monitor.lifecycle_interval_ms = clamp_interval(
        config.monitor.lifecycle_interval_ms,
        defaults.lifecycle_interval_ms,
    );
    config.monitor.gfx_interval_ms =
        clamp_interval(config.monitor.gfx_interval_ms, defaults.gfx_interval_ms);
    if config.monitor.fps_cache_max_idle_polls == 0 {
        config.monitor.fps_cache_max_idle_polls = defaults.fps_cache_max_idle_polls;
    }
    if config.adb.command_timeout_ms < 1000 {
        config.adb.command_timeout_ms = AdbSettings::default().command_timeout_ms;
    }
    if config.companion.port == 0 {
        config.companion.port = CompanionSettings::default().port;
    }
    if config.companion.connect_timeout_ms == 0 {
        config.companion.connect_timeout_ms = CompanionSettings::default().connect_timeout_ms;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = LoggingSettings::default().log_level;
    }
    config
}
