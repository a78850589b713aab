//! Configuration management for the controller and its managers
//!
//! This module provides runtime configuration loading from JSON files so
//! latencies, sensor timing and the listen address can be adjusted without
//! recompilation. Every section has defaults, so partial files are accepted.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Default location of the configuration file relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "assets/symfopi_config.json";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub manager: ManagerConfig,
    pub playback: PlaybackConfig,
    pub external_api: ExternalApiConfig,
    pub motion: MotionConfig,
}

/// Control surface parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP control surface binds to
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

/// Parameters shared by every manager handle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Upper bound a blocking wrapper operation waits for its reply
    pub reply_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 30_000,
        }
    }
}

impl ManagerConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Playback manager parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Simulated seek/load cost of switching playlists
    pub playlist_switch_latency_ms: u64,
    /// Capacity of the playback event broadcast channel
    pub event_buffer: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            playlist_switch_latency_ms: 500,
            event_buffer: 64,
        }
    }
}

impl PlaybackConfig {
    pub fn playlist_switch_latency(&self) -> Duration {
        Duration::from_millis(self.playlist_switch_latency_ms)
    }
}

/// Mocked music-service API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalApiConfig {
    /// Simulated network round trip per request
    pub latency_ms: u64,
    /// Playlist identifiers returned by `get_playlists_list`
    pub playlists: Vec<String>,
}

impl Default for ExternalApiConfig {
    fn default() -> Self {
        Self {
            latency_ms: 5_000,
            playlists: vec![
                "playlist1".to_string(),
                "playlist2".to_string(),
                "playlist3".to_string(),
            ],
        }
    }
}

impl ExternalApiConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Mocked motion sensor parameters
///
/// Phase durations are drawn uniformly from the inclusive
/// `[min, max]` millisecond ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub present_min_ms: u64,
    pub present_max_ms: u64,
    pub absent_min_ms: u64,
    pub absent_max_ms: u64,
    /// Enable the monitor as soon as the supervisor starts
    pub enable_on_start: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            present_min_ms: 10_000,
            present_max_ms: 15_000,
            absent_min_ms: 4_000,
            absent_max_ms: 8_000,
            enable_on_start: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file is missing or
    /// its JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }

    /// Reject values the managers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.manager.reply_timeout_ms == 0 {
            bail!("manager.reply_timeout_ms must be greater than 0");
        }
        if self.playback.event_buffer == 0 {
            bail!("playback.event_buffer must be greater than 0");
        }
        let motion = &self.motion;
        if motion.present_min_ms > motion.present_max_ms {
            bail!(
                "motion present range is inverted ({} > {})",
                motion.present_min_ms,
                motion.present_max_ms
            );
        }
        if motion.absent_min_ms > motion.absent_max_ms {
            bail!(
                "motion absent range is inverted ({} > {})",
                motion.absent_min_ms,
                motion.absent_max_ms
            );
        }
        Ok(())
    }
}
