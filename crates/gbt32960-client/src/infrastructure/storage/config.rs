//! TOML-based configuration for the terminal.
//!
//! The file is optional: every field has a serde default, so a missing file,
//! an empty file, or a file with only some sections all produce a usable
//! [`ClientConfig`].
//!
//! ```toml
//! log_level = "info"
//!
//! [platform]
//! host = "127.0.0.1"
//! port = 32960
//!
//! [vehicle]
//! vin = "LSVAA21E7JN000001"
//!
//! [session]
//! read_buffer_size = 4096
//! max_data_length = 400
//! retain_partial_marker = true
//! auto_ack = true
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  Section structs
//! carry `#[serde(default)]` so a whole missing section falls back to its
//! `Default` impl.

use std::path::{Path, PathBuf};

use gbt32960_core::protocol::packet::MAX_DATA_LENGTH;
use gbt32960_core::{DecoderConfig, ProtocolError, ResyncPolicy, Vin};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::SessionConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level terminal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Where the platform listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Identity of this terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleConfig {
    /// Up to 17 characters; shorter values are padded with `'0'` on the wire.
    #[serde(default = "default_vin")]
    pub vin: String,
}

/// Receive-path and acknowledgement behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Frames declaring a larger payload are skipped.  Values above the
    /// protocol maximum of 400 are clamped to it.
    #[serde(default = "default_max_data_length")]
    pub max_data_length: usize,
    /// Keep a trailing `0x23` when flushing a buffer without a start marker.
    #[serde(default = "default_true")]
    pub retain_partial_marker: bool,
    /// Reply `Success` to every command that awaits an acknowledgement.
    #[serde(default = "default_true")]
    pub auto_ack: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    32960
}
fn default_vin() -> String {
    "LSVAA21E7JN000001".to_string()
}
fn default_read_buffer_size() -> usize {
    4096
}
fn default_max_data_length() -> usize {
    MAX_DATA_LENGTH
}
fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            platform: PlatformConfig::default(),
            vehicle: VehicleConfig::default(),
            session: SessionSettings::default(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self { vin: default_vin() }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            max_data_length: default_max_data_length(),
            retain_partial_marker: default_true(),
            auto_ack: default_true(),
        }
    }
}

impl ClientConfig {
    /// Session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        let resync = if self.session.retain_partial_marker {
            ResyncPolicy::RetainPartialMarker
        } else {
            ResyncPolicy::FlushAll
        };
        SessionConfig {
            host: self.platform.host.clone(),
            port: self.platform.port,
            read_buffer_size: self.session.read_buffer_size,
            decoder: DecoderConfig {
                max_data_length: self.session.max_data_length.min(MAX_DATA_LENGTH),
                resync,
            },
        }
    }

    /// The configured VIN in wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::VinTooLong`] if the VIN exceeds 17 bytes.
    pub fn vin(&self) -> Result<Vin, ProtocolError> {
        Vin::new(&self.vehicle.vin)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `ClientConfig` from `path`, returning `ClientConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path` as pretty TOML, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
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

// ── Tests ─────────────────────────────────────────────────────────────────────
