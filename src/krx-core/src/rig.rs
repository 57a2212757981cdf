// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

use crate::radio::mode::RadioMode;

/// Lowest frequency (kHz) the CAT link will command.
pub const CAT_MIN_FREQ_KHZ: f64 = 100.0;
/// Highest frequency (kHz) the CAT link will command.
pub const CAT_MAX_FREQ_KHZ: f64 = 30_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Vfo {
    #[default]
    A,
    B,
}

/// Last-known transceiver state as reported by the rig-control daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigState {
    pub freq_khz: Option<f64>,
    pub mode: RadioMode,
    pub vfo: Vfo,
    pub ptt_active: bool,
    /// Flips false on any I/O failure or malformed reply; only a fresh
    /// connect restores it.
    pub link_healthy: bool,
}

impl Default for RigState {
    fn default() -> Self {
        Self {
            freq_khz: None,
            mode: RadioMode::USB,
            vfo: Vfo::A,
            ptt_active: false,
            link_healthy: false,
        }
    }
}

impl RigState {
    pub fn in_cat_range(freq_khz: f64) -> bool {
        (CAT_MIN_FREQ_KHZ..=CAT_MAX_FREQ_KHZ).contains(&freq_khz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cat_range_inclusive() {
        assert!(RigState::in_cat_range(100.0));
        assert!(RigState::in_cat_range(30_000.0));
        assert!(!RigState::in_cat_range(99.999));
        assert!(!RigState::in_cat_range(30_000.5));
    }

    #[test]
    fn test_default_is_unhealthy() {
        let state = RigState::default();
        assert!(!state.link_healthy);
        assert_eq!(state.mode, RadioMode::USB);
        assert_eq!(state.vfo, Vfo::A);
    }
}
