// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for krx-client.
//!
//! Settings live in the `[krx-client]` section of `krx-rs.toml`, searched in
//! this order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./krx-rs.toml` (current directory)
//! 3. `~/.config/krx-rs/krx-rs.toml` (XDG config)
//! 4. `/etc/krx-rs/krx-rs.toml` (system-wide)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use krx_app::{ConfigError, ConfigFile};
use krx_core::session::SessionFlags;
use krx_core::waterfall::limits::DEFAULT_MAX_ZOOM;
use krx_core::RadioMode;
use krx_protocol::dxcluster::{DEFAULT_DXCLUSTER_HOST, DEFAULT_DXCLUSTER_PORT};
use krx_protocol::ServerEndpoint;

use crate::audio_client::{DEFAULT_INPUT_RATE, DEFAULT_OUTPUT_RATE, DEFAULT_QUEUE_LEN, MAX_VOLUME_PCT};
use crate::cat_client::{CatErrorPolicy, DEFAULT_RIGCTL_PORT};

/// Top-level client configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// General settings
    pub general: GeneralConfig,
    /// SDR server connection
    pub server: ServerConfig,
    /// Waterfall stream
    pub waterfall: WaterfallConfig,
    /// Receiver audio stream
    pub audio: AudioConfig,
    /// Transceiver CAT link
    pub cat: CatConfig,
    /// DX cluster feed
    pub dxcluster: DxClusterConfig,
    pub recording: RecordingConfig,
    /// Link toggles between waterfall, audio and CAT
    pub session: SessionFlags,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Station callsign, also used for the DX cluster login
    pub callsign: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host[:port[:password]]`
    pub address: Option<String>,
    /// Overrides a password given in `address`
    pub password: Option<String>,
    /// Query `/status` before opening a stream
    pub probe_status: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: None,
            password: None,
            probe_status: true,
        }
    }
}

impl ServerConfig {
    pub fn endpoint(&self) -> Result<Option<ServerEndpoint>, String> {
        let Some(address) = &self.address else {
            return Ok(None);
        };
        let mut endpoint: ServerEndpoint = address
            .parse()
            .map_err(|e| format!("[server].address '{address}': {e}"))?;
        if let Some(password) = &self.password {
            endpoint.password = password.clone();
        }
        Ok(Some(endpoint))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterfallConfig {
    pub zoom: u32,
    /// Initial centre in kHz; the band centre when unset
    pub freq_khz: Option<f64>,
    /// Rows averaged per displayed row
    pub averaging: usize,
    pub history_rows: usize,
    pub auto_scale: bool,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            zoom: 8,
            freq_khz: None,
            averaging: 1,
            history_rows: 3,
            auto_scale: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    /// Fixed mode; picked from the frequency when unset and auto mode is on
    pub mode: Option<RadioMode>,
    pub freq_khz: f64,
    pub input_rate: u32,
    pub output_rate: u32,
    /// 1 = mono, 2 = stereo
    pub channels: u16,
    /// Playback queue length in chunks
    pub queue_len: usize,
    /// Frames per playback chunk
    pub chunks: usize,
    /// Volume percentage (0..=200)
    pub volume: u16,
    pub cw_pitch_hz: i32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: None,
            freq_khz: 14_200.0,
            input_rate: DEFAULT_INPUT_RATE,
            output_rate: DEFAULT_OUTPUT_RATE,
            channels: 2,
            queue_len: DEFAULT_QUEUE_LEN,
            chunks: 1,
            volume: 100,
            cw_pitch_hz: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatConfig {
    pub enabled: bool,
    /// rigctld host
    pub host: String,
    /// rigctld port
    pub port: u16,
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// `silent` or `surface`
    pub error_policy: CatErrorPolicy,
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: DEFAULT_RIGCTL_PORT,
            poll_interval_ms: 500,
            error_policy: CatErrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DxClusterConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Login callsign; falls back to `[general].callsign`
    pub callsign: Option<String>,
    /// Reconnect delay in seconds
    pub reconnect_delay_secs: u64,
}

impl Default for DxClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: DEFAULT_DXCLUSTER_HOST.to_string(),
            port: DEFAULT_DXCLUSTER_PORT,
            callsign: None,
            reconnect_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory receiving WAV recordings
    pub dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        self.server.endpoint()?;

        if self.waterfall.zoom > DEFAULT_MAX_ZOOM {
            return Err(format!(
                "[waterfall].zoom must be within 0..={DEFAULT_MAX_ZOOM}"
            ));
        }
        if self.waterfall.history_rows == 0 {
            return Err("[waterfall].history_rows must be > 0".to_string());
        }

        if self.audio.queue_len == 0 {
            return Err("[audio].queue_len must be > 0".to_string());
        }
        if self.audio.input_rate == 0 || self.audio.output_rate == 0 {
            return Err("[audio].input_rate and output_rate must be > 0".to_string());
        }
        if !(1..=2).contains(&self.audio.channels) {
            return Err("[audio].channels must be 1 or 2".to_string());
        }
        if self.audio.chunks == 0 {
            return Err("[audio].chunks must be > 0".to_string());
        }
        if self.audio.volume > MAX_VOLUME_PCT {
            return Err(format!("[audio].volume must be within 0..={MAX_VOLUME_PCT}"));
        }

        if self.cat.enabled {
            if self.cat.port == 0 {
                return Err("[cat].port must be > 0 when enabled".to_string());
            }
            if self.cat.host.trim().is_empty() {
                return Err("[cat].host must not be empty when enabled".to_string());
            }
        }
        if self.cat.poll_interval_ms == 0 {
            return Err("[cat].poll_interval_ms must be > 0".to_string());
        }

        if self.dxcluster.enabled {
            if self.dxcluster.port == 0 {
                return Err("[dxcluster].port must be > 0 when enabled".to_string());
            }
            if self.dx_callsign().is_none() {
                return Err(
                    "[dxcluster].callsign or [general].callsign must be set when enabled"
                        .to_string(),
                );
            }
        }

        Ok(())
    }

    /// Callsign used for the DX cluster login.
    pub fn dx_callsign(&self) -> Option<&str> {
        self.dxcluster
            .callsign
            .as_deref()
            .or(self.general.callsign.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Generate an example configuration as a TOML string.
    pub fn example_toml() -> String {
        #[derive(Serialize)]
        struct Document<'a> {
            #[serde(rename = "krx-client")]
            client: &'a ClientConfig,
        }

        let example = ClientConfig {
            general: GeneralConfig {
                callsign: Some("N0CALL".to_string()),
                log_level: Some("info".to_string()),
            },
            server: ServerConfig {
                address: Some("sdr.example.org:8073".to_string()),
                ..ServerConfig::default()
            },
            waterfall: WaterfallConfig {
                freq_khz: Some(14_175.0),
                ..WaterfallConfig::default()
            },
            audio: AudioConfig {
                mode: Some(RadioMode::USB),
                ..AudioConfig::default()
            },
            cat: CatConfig {
                enabled: true,
                ..CatConfig::default()
            },
            dxcluster: DxClusterConfig::default(),
            recording: RecordingConfig::default(),
            session: SessionFlags::default(),
        };

        toml::to_string_pretty(&Document { client: &example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for ClientConfig {
    fn section_key() -> &'static str {
        "krx-client"
    }
}
