// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Hamlib `rigctld` long-form commands and reply parsing.

use std::fmt;

use krx_core::rig::Vfo;
use krx_core::{ParseError, RadioMode};

/// Reply fragment meaning "command not supported by this rig".
pub const UNSUPPORTED_SENTINEL: &str = "RPRT -5";
/// Passband width sent along with `\set_mode`.
pub const SET_MODE_PASSBAND_HZ: u32 = 2400;
/// Longest reply line accepted.
pub const MAX_REPLY_BYTES: usize = 64;
/// Prefix of the daemon's status line (`RPRT <code>`).
pub const STATUS_PREFIX: &str = "RPRT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigCommand {
    GetFreq,
    SetFreq { hz: u64 },
    GetMode,
    SetMode(RadioMode),
    GetVfo,
    GetPtt,
}

impl RigCommand {
    pub fn set_freq_khz(freq_khz: f64) -> Self {
        RigCommand::SetFreq {
            hz: (freq_khz * 1000.0).round().max(0.0) as u64,
        }
    }

    /// Command line including the terminating newline.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }

    /// Lines in a successful reply. `\get_mode` answers mode then passband.
    pub fn reply_lines(&self) -> usize {
        match self {
            RigCommand::GetMode => 2,
            _ => 1,
        }
    }
}

/// An `RPRT` line ends a reply early, whatever the command expected.
pub fn is_status_line(line: &[u8]) -> bool {
    line.starts_with(STATUS_PREFIX.as_bytes())
}

fn rigctl_mode_name(mode: RadioMode) -> &'static str {
    match mode {
        RadioMode::NFM => "FM",
        other => other.as_str(),
    }
}

impl fmt::Display for RigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RigCommand::GetFreq => f.write_str("\\get_freq"),
            RigCommand::SetFreq { hz } => write!(f, "\\set_freq {hz}"),
            RigCommand::GetMode => f.write_str("\\get_mode"),
            RigCommand::SetMode(mode) => write!(
                f,
                "\\set_mode {} {}",
                rigctl_mode_name(*mode),
                SET_MODE_PASSBAND_HZ
            ),
            RigCommand::GetVfo => f.write_str("\\get_vfo"),
            RigCommand::GetPtt => f.write_str("\\get_ptt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigReply {
    Value(String),
    Unsupported,
    Empty,
}

impl RigReply {
    pub fn classify(raw: &[u8]) -> Self {
        if raw.is_empty() {
            return RigReply::Empty;
        }
        let text = String::from_utf8_lossy(raw);
        if text.contains(UNSUPPORTED_SENTINEL) {
            RigReply::Unsupported
        } else {
            RigReply::Value(text.into_owned())
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, RigReply::Value(_))
    }
}

fn first_line(reply: &str) -> &str {
    reply.lines().next().unwrap_or_default().trim()
}

/// `\get_freq` reply (Hz) converted to kHz.
pub fn parse_freq_khz(reply: &str) -> Result<f64, ParseError> {
    let line = first_line(reply);
    line.parse::<f64>()
        .map(|hz| hz / 1000.0)
        .map_err(|_| ParseError::RigReply(line.to_string()))
}

/// Modes this client cannot represent fall back to USB.
pub fn parse_mode(reply: &str) -> RadioMode {
    match first_line(reply) {
        "USB" => RadioMode::USB,
        "LSB" => RadioMode::LSB,
        "CW" => RadioMode::CW,
        "AM" => RadioMode::AM,
        _ => RadioMode::USB,
    }
}

pub fn parse_vfo(reply: &str) -> Vfo {
    if reply.contains("VFOA") {
        Vfo::A
    } else {
        Vfo::B
    }
}

pub fn parse_ptt(reply: &str) -> bool {
    first_line(reply) == "1"
}
