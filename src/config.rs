//! Client configuration: defaults, optional JSON config file, environment
//! overrides, then validation.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::stream::PumpConfig;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7278/PSTapi";
const DEFAULT_POLL_INTERVAL_MS: u64 = 10;
const DEFAULT_STREAM_BUFFER_BYTES: usize = 4096;
const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Recommended poll interval bounds in milliseconds. Faster risks busy
/// polling, slower risks multiple records per read.
pub const MIN_POLL_INTERVAL_MS: u64 = 2;
pub const MAX_POLL_INTERVAL_MS: u64 = 100;

/// Recommended stream buffer bounds in bytes. Smaller buffers make split
/// records likely, and split records are dropped, not reassembled.
pub const MIN_STREAM_BUFFER_BYTES: usize = 1024;
pub const MAX_STREAM_BUFFER_BYTES: usize = 10240;

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    base_url: Option<String>,
    poll_interval_ms: Option<u64>,
    stream_buffer_bytes: Option<usize>,
    history_capacity: Option<usize>,
    log_single_responses: Option<bool>,
    log_continuous_responses: Option<bool>,
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Device REST base URL; endpoint names are appended to it.
    pub base_url: String,
    /// Pause between stream reads.
    pub poll_interval: Duration,
    /// Bytes per stream read.
    pub stream_buffer_bytes: usize,
    /// Frames retained in the history ring.
    pub history_capacity: usize,
    /// Debug-log bodies of single-shot control responses.
    pub log_single_responses: bool,
    /// Attach a debug-logging observer to the telemetry stream.
    pub log_continuous_responses: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stream_buffer_bytes: DEFAULT_STREAM_BUFFER_BYTES,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_single_responses: false,
            log_continuous_responses: false,
        }
    }
}

impl TrackerConfig {
    /// Load configuration: defaults, then the JSON file named by
    /// `TRACKER_CONFIG` (if set), then environment overrides, then
    /// validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRACKER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackerConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            poll_interval: file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            stream_buffer_bytes: file
                .stream_buffer_bytes
                .unwrap_or(defaults.stream_buffer_bytes),
            history_capacity: file.history_capacity.unwrap_or(defaults.history_capacity),
            log_single_responses: file
                .log_single_responses
                .unwrap_or(defaults.log_single_responses),
            log_continuous_responses: file
                .log_continuous_responses
                .unwrap_or(defaults.log_continuous_responses),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(base_url) = std::env::var("TRACKER_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.base_url = base_url;
            }
        }
        if let Ok(interval) = std::env::var("TRACKER_POLL_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("TRACKER_POLL_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.poll_interval = Duration::from_millis(millis);
        }
        if let Ok(buffer) = std::env::var("TRACKER_STREAM_BUFFER_BYTES") {
            self.stream_buffer_bytes = buffer
                .parse()
                .map_err(|_| anyhow!("TRACKER_STREAM_BUFFER_BYTES must be an integer byte count"))?;
        }
        if let Ok(capacity) = std::env::var("TRACKER_HISTORY_CAPACITY") {
            self.history_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("TRACKER_HISTORY_CAPACITY must be an integer frame count"))?;
        }
        if let Ok(flag) = std::env::var("TRACKER_LOG_SINGLE_RESPONSES") {
            self.log_single_responses = parse_bool("TRACKER_LOG_SINGLE_RESPONSES", &flag)?;
        }
        if let Ok(flag) = std::env::var("TRACKER_LOG_CONTINUOUS_RESPONSES") {
            self.log_continuous_responses = parse_bool("TRACKER_LOG_CONTINUOUS_RESPONSES", &flag)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| anyhow!("invalid base url '{}': {}", self.base_url, e))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported base url scheme '{}'; expected http(s)",
                    other
                ))
            }
        }

        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.stream_buffer_bytes == 0 {
            return Err(anyhow!("stream buffer size must be greater than zero"));
        }
        if self.history_capacity == 0 {
            return Err(anyhow!("history capacity must be greater than zero"));
        }

        let poll_ms = self.poll_interval.as_millis() as u64;
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_ms) {
            log::warn!(
                "poll interval {}ms is outside the recommended {}..={}ms range",
                poll_ms,
                MIN_POLL_INTERVAL_MS,
                MAX_POLL_INTERVAL_MS
            );
        }
        if !(MIN_STREAM_BUFFER_BYTES..=MAX_STREAM_BUFFER_BYTES).contains(&self.stream_buffer_bytes)
        {
            log::warn!(
                "stream buffer of {} bytes is outside the recommended {}..={} byte range",
                self.stream_buffer_bytes,
                MIN_STREAM_BUFFER_BYTES,
                MAX_STREAM_BUFFER_BYTES
            );
        }
        Ok(())
    }

    /// Read-loop tuning for the stream pump.
    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            buffer_size: self.stream_buffer_bytes,
            poll_interval: self.poll_interval,
        }
    }
}

fn read_config_file(path: &Path) -> Result<TrackerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(anyhow!("{} must be one of 1, 0, true, false", key)),
    }
}
