use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::serial::{LinkTiming, SerialBackend};
use crate::protocol::DUMP_REQUEST;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HostSettings {
    /// Pin a single port instead of scanning
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_fast_retry_secs")]
    pub fast_retry_secs: f64,
    #[serde(default = "default_slow_retry_secs")]
    pub slow_retry_secs: f64,
    #[serde(default = "default_dump_grace_secs")]
    pub dump_grace_secs: f64,
    #[serde(default = "default_dump_command")]
    pub dump_command: String,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    #[serde(default = "default_metrics_history")]
    pub metrics_history: usize,
    #[serde(default = "default_console_history")]
    pub console_history: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_baud_rate() -> u32 {
    115200
}
fn default_read_timeout_ms() -> u64 {
    5
}
fn default_fast_retry_secs() -> f64 {
    2.0
}
fn default_slow_retry_secs() -> f64 {
    10.0
}
fn default_dump_grace_secs() -> f64 {
    250.0
}
fn default_dump_command() -> String {
    DUMP_REQUEST.to_string()
}
fn default_max_line_length() -> usize {
    4096
}
fn default_metrics_history() -> usize {
    10
}
fn default_console_history() -> usize {
    5000
}
fn default_tick_interval_ms() -> u64 {
    5 // host loop rate, ~200 Hz
}
fn default_log_dir() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("polylink")
        .join("logs")
        .to_string_lossy()
        .to_string()
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            fast_retry_secs: default_fast_retry_secs(),
            slow_retry_secs: default_slow_retry_secs(),
            dump_grace_secs: default_dump_grace_secs(),
            dump_command: default_dump_command(),
            max_line_length: default_max_line_length(),
            metrics_history: default_metrics_history(),
            console_history: default_console_history(),
            tick_interval_ms: default_tick_interval_ms(),
            log_dir: default_log_dir(),
        }
    }
}

impl HostSettings {
    /// Reject values the link cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.baud_rate == 0 {
            return Err("baud_rate must be non-zero".to_string());
        }
        for (name, secs) in [
            ("fast_retry_secs", self.fast_retry_secs),
            ("slow_retry_secs", self.slow_retry_secs),
            ("dump_grace_secs", self.dump_grace_secs),
        ] {
            if let Err(e) = Duration::try_from_secs_f64(secs) {
                return Err(format!(
                    "{} must be a non-negative number of seconds, got {}: {}",
                    name, secs, e
                ));
            }
        }
        if self.slow_retry_secs < self.fast_retry_secs {
            return Err("slow_retry_secs must not be shorter than fast_retry_secs".to_string());
        }
        if self.dump_command.trim().is_empty() {
            return Err("dump_command must not be empty".to_string());
        }
        Ok(())
    }

    /// Unvalidated values are clamped rather than rejected here.
    pub fn link_timing(&self) -> LinkTiming {
        LinkTiming {
            fast_retry: secs_to_duration(self.fast_retry_secs),
            slow_retry: secs_to_duration(self.slow_retry_secs),
            dump_grace: secs_to_duration(self.dump_grace_secs),
            dump_command: self.dump_command.clone(),
        }
    }

    pub fn serial_backend(&self) -> SerialBackend {
        SerialBackend {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
            fixed_port: self.port.clone(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) => d,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

/// `<config dir>/polylink/settings.json`
pub fn default_settings_path() -> Result<PathBuf, String> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| "Failed to get config dir".to_string())?;
    Ok(config_dir.join("polylink").join("settings.json"))
}

/// Load settings from `path`. A missing file yields defaults.
pub fn load_settings(path: &Path) -> Result<HostSettings, String> {
    if !path.exists() {
        tlog!("[settings] {} not found, using defaults", path.display());
        return Ok(HostSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings: {}", e))?;

    let settings: HostSettings = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse settings: {}", e))?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &HostSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {}", e))?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
}
