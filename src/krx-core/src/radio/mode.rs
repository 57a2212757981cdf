// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Frequency (kHz) below which the lower sideband is the amateur convention.
pub const AUTO_MODE_SPLIT_KHZ: f64 = 10_000.0;

/// Demodulation mode requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioMode {
    USB,
    LSB,
    CW,
    AM,
    NFM,
}

impl RadioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RadioMode::USB => "USB",
            RadioMode::LSB => "LSB",
            RadioMode::CW => "CW",
            RadioMode::AM => "AM",
            RadioMode::NFM => "NFM",
        }
    }

    /// Lowercase token used in `SET mod=` control lines.
    pub fn wire_name(&self) -> &'static str {
        match self {
            RadioMode::USB => "usb",
            RadioMode::LSB => "lsb",
            RadioMode::CW => "cw",
            RadioMode::AM => "am",
            RadioMode::NFM => "nbfm",
        }
    }

    pub fn is_ssb(&self) -> bool {
        matches!(self, RadioMode::USB | RadioMode::LSB)
    }

    /// Sideband picked by the auto-mode toggle for a frequency.
    pub fn auto_for(freq_khz: f64) -> RadioMode {
        if freq_khz < AUTO_MODE_SPLIT_KHZ {
            RadioMode::LSB
        } else {
            RadioMode::USB
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RadioMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USB" => Ok(RadioMode::USB),
            "LSB" => Ok(RadioMode::LSB),
            "CW" => Ok(RadioMode::CW),
            "AM" => Ok(RadioMode::AM),
            "NFM" | "NBFM" | "FM" => Ok(RadioMode::NFM),
            other => Err(ParseError::field("mode", format!("unknown mode '{other}'"))),
        }
    }
}
