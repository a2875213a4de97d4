// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: the process-wide knobs the controller treats as
//! given (spec §10 "Configuration").

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracectl_core::ChannelAttr;

/// Default per-channel subbuffer size, in bytes (4 KiB).
const DEFAULT_SUBBUF_SIZE: u64 = 4096;
const DEFAULT_SUBBUF_COUNT: u64 = 4;
const DEFAULT_SWITCH_TIMER_US: u32 = 0;
const DEFAULT_READ_TIMER_US: u32 = 0;

/// Process-wide configuration loaded from a TOML file, with hard-coded
/// defaults when absent (spec §10: "no environment-variable sprawl").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root state directory under which the socket, log, and lock files live.
    pub state_dir: PathBuf,
    /// Consumer's local trace path, e.g. `/var/lib/tracectl/trace`. `None`
    /// disables local trace-directory creation on `start_trace`.
    pub trace_base_path: Option<PathBuf>,
    pub trace_subdir: String,
    /// Default attributes for ordinary (per-cpu) channels.
    pub default_channel_attr: ChannelAttr,
    /// Default attributes for the metadata channel.
    pub default_metadata_attr: ChannelAttr,
    /// Protocol major version this daemon supports; apps whose
    /// registration major doesn't match are rejected (spec §4.4).
    pub supported_protocol_major: u32,
    /// Ceiling for the `APPS` file-descriptor budget class (spec §4.3).
    pub fd_budget_ceiling: u64,
    /// Consumer daemon socket for 32-bit apps. `None` leaves that bitness
    /// without a consumer, rejecting registrations from it (spec §4.4).
    pub consumerd32_socket: Option<PathBuf>,
    /// Consumer daemon socket for 64-bit apps.
    pub consumerd64_socket: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = PathBuf::from("/var/run/tracectl");
        Self {
            state_dir,
            trace_base_path: Some(PathBuf::from("/var/lib/tracectl/trace")),
            trace_subdir: "ust".to_string(),
            default_channel_attr: ChannelAttr {
                subbuf_size: DEFAULT_SUBBUF_SIZE,
                subbuf_count: DEFAULT_SUBBUF_COUNT,
                overwrite: false,
                switch_timer_interval: DEFAULT_SWITCH_TIMER_US,
                read_timer_interval: DEFAULT_READ_TIMER_US,
                output: tracectl_core::OutputMode::Mmap,
            },
            default_metadata_attr: ChannelAttr::defaults_metadata(),
            supported_protocol_major: 2,
            fd_budget_ceiling: 65_536,
            consumerd32_socket: None,
            consumerd64_socket: Some(PathBuf::from("/var/run/tracectl/consumerd64.sock")),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults for any
    /// field the file doesn't set (via `#[serde(default)]`).
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(ConfigError::Io(err.to_string())),
        };
        toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("tracectl.sock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("tracectl.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("tracectl.pid")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
