//! On-disk configuration of the master: ports, layout, liveness timings,
//! pairing limits and the clients it already knows.
//!
//! The default location is `config.toml` in the per-user config directory
//! (`%APPDATA%\KVMOverIP`, `$XDG_CONFIG_HOME/kvmoverip` falling back to
//! `~/.config/kvmoverip`, or `~/Library/Application Support/KVMOverIP`).
//!
//! # Example file
//!
//! ```toml
//! [master]
//! log_level = "info"
//!
//! [network]
//! control_port = 24800
//! bind_address = "192.168.1.20"
//!
//! [liveness]
//! probe_interval_ms = 500
//! miss_threshold = 5
//!
//! [layout]
//! master_screen_width = 2560
//! master_screen_height = 1440
//!
//! [[layout.clients]]
//! client_id = "6c0a9a53-8f64-4a5e-9d53-0f1f6d5d8a11"
//! x_offset = 2560
//! y_offset = 0
//! width = 1920
//! height = 1080
//!
//! [[clients]]
//! client_id = "6c0a9a53-8f64-4a5e-9d53-0f1f6d5d8a11"
//! name = "dev-linux"
//! trusted = true
//! ```
//!
//! Absent sections and fields take their defaults, so a missing file and a
//! file from an older build both load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kvm_core::LayoutEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::liveness::LivenessConfig;
use crate::application::network_settings::{
    NetworkConfigError, NetworkSettings, DEFAULT_CONTROL_PORT, DEFAULT_DISCOVERY_PORT, DEFAULT_INPUT_PORT,
};
use crate::infrastructure::network::connection_manager::PairingPolicy;

/// Failure to locate, read or write the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the platform variable nor `HOME` is set.
    #[error("no per-user configuration directory on this system")]
    NoPlatformConfigDir,

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// The whole `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub master: MasterConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub liveness: LivenessSection,
    #[serde(default)]
    pub pairing: PairingSection,
    #[serde(default)]
    pub clients: Vec<ClientEntry>,
}

/// `[master]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// `[network]`: the raw form of [`NetworkSettings`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP port for the control channel.
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    /// UDP port for the input channel.
    #[serde(default = "default_input_port")]
    pub input_port: u16,
    /// UDP port for LAN discovery broadcasts.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Listen address; the unspecified address listens everywhere.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Master screen size plus positioned client screens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutConfig {
    #[serde(default = "default_screen_width")]
    pub master_screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub master_screen_height: u32,
    #[serde(default)]
    pub clients: Vec<ClientLayoutEntry>,
}

/// `[[layout.clients]]`: one client rectangle in virtual-desktop pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientLayoutEntry {
    pub client_id: Uuid,
    pub x_offset: i32,
    pub y_offset: i32,
    pub width: u32,
    pub height: u32,
}

/// Probe and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessSection {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_miss_threshold")]
    pub miss_threshold: u32,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_absence_timeout_secs")]
    pub absence_timeout_secs: u64,
}

/// PIN pairing limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingSection {
    #[serde(default = "default_max_pin_attempts")]
    pub max_pin_attempts: u32,
    #[serde(default = "default_pin_expiry_secs")]
    pub pin_expiry_secs: u64,
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
}

/// Persisted record of a known client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientEntry {
    pub client_id: Uuid,
    pub name: String,
    /// Completed PIN pairing before; reconnects skip pairing.
    #[serde(default)]
    pub trusted: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}
fn default_input_port() -> u16 {
    DEFAULT_INPUT_PORT
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_screen_width() -> u32 {
    1920
}
fn default_screen_height() -> u32 {
    1080
}
fn default_probe_interval_ms() -> u64 {
    1_000
}
fn default_probe_timeout_ms() -> u64 {
    3_000
}
fn default_miss_threshold() -> u32 {
    3
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_absence_timeout_secs() -> u64 {
    300
}
fn default_max_pin_attempts() -> u32 {
    3
}
fn default_pin_expiry_secs() -> u64 {
    60
}
fn default_lockout_secs() -> u64 {
    60
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            input_port: default_input_port(),
            discovery_port: default_discovery_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            master_screen_width: default_screen_width(),
            master_screen_height: default_screen_height(),
            clients: Vec::new(),
        }
    }
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            miss_threshold: default_miss_threshold(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            absence_timeout_secs: default_absence_timeout_secs(),
        }
    }
}

impl Default for PairingSection {
    fn default() -> Self {
        Self {
            max_pin_attempts: default_max_pin_attempts(),
            pin_expiry_secs: default_pin_expiry_secs(),
            lockout_secs: default_lockout_secs(),
        }
    }
}

// ── Conversions to application types ──────────────────────────────────────────

impl NetworkConfig {
    /// Parses and validates the section into [`NetworkSettings`].
    ///
    /// # Errors
    ///
    /// Returns the [`NetworkConfigError`] for a bad address or port set.
    pub fn to_settings(&self) -> Result<NetworkSettings, NetworkConfigError> {
        NetworkSettings::from_parts(self.control_port, self.input_port, self.discovery_port, &self.bind_address)
    }

    pub fn from_settings(settings: &NetworkSettings) -> Self {
        Self {
            control_port: settings.control_port,
            input_port: settings.input_port,
            discovery_port: settings.discovery_port,
            bind_address: settings.bind_address.to_string(),
        }
    }
}

impl From<ClientLayoutEntry> for LayoutEntry {
    fn from(e: ClientLayoutEntry) -> Self {
        LayoutEntry {
            client_id: e.client_id,
            x_offset: e.x_offset,
            y_offset: e.y_offset,
            width: e.width,
            height: e.height,
        }
    }
}

impl From<LayoutEntry> for ClientLayoutEntry {
    fn from(e: LayoutEntry) -> Self {
        ClientLayoutEntry {
            client_id: e.client_id,
            x_offset: e.x_offset,
            y_offset: e.y_offset,
            width: e.width,
            height: e.height,
        }
    }
}

impl From<&LivenessSection> for LivenessConfig {
    fn from(s: &LivenessSection) -> Self {
        LivenessConfig {
            probe_interval: Duration::from_millis(s.probe_interval_ms.max(1)),
            probe_timeout: Duration::from_millis(s.probe_timeout_ms),
            miss_threshold: s.miss_threshold,
            handshake_timeout: Duration::from_millis(s.handshake_timeout_ms),
            absence_timeout: Duration::from_secs(s.absence_timeout_secs),
            // Taken from `[pairing]` by `AppState::from_config`.
            ..LivenessConfig::default()
        }
    }
}

impl From<&PairingSection> for PairingPolicy {
    fn from(s: &PairingSection) -> Self {
        PairingPolicy {
            max_pin_attempts: s.max_pin_attempts.max(1),
            pin_expiry: Duration::from_secs(s.pin_expiry_secs),
            lockout: Duration::from_secs(s.lockout_secs),
        }
    }
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// The per-user directory holding `config.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the environment names no
/// home or config directory.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Default location of `config.toml`.
///
/// # Errors
///
/// See [`config_dir`].
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist yet.
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML; [`ConfigError::Io`] for any
/// read failure except a missing file.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// [`ConfigError::Io`] if the directory or file cannot be written.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KVMOverIP"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("kvmoverip"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("KVMOverIP"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
