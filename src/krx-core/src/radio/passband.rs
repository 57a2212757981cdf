// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Passband bookkeeping. Cutoffs are relative to the tuned frequency, in Hz.

use serde::{Deserialize, Serialize};

use super::mode::RadioMode;

pub const LOW_CUT_SSB_HZ: i32 = 30;
pub const HIGH_CUT_SSB_HZ: i32 = 3000;
pub const HIGHLOW_CUT_AM_HZ: i32 = 6000;
pub const CW_HALF_WIDTH_HZ: i32 = 200;
pub const DEFAULT_CW_PITCH_HZ: i32 = 600;
/// Narrowest passband kept when deltas would cross the cutoffs.
pub const MIN_PASSBAND_WIDTH_HZ: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passband {
    pub mode: RadioMode,
    pub low_cut_hz: i32,
    pub high_cut_hz: i32,
}

impl Passband {
    /// Derive the cutoffs for `mode` from the per-mode defaults plus the
    /// caller's `(delta_low, delta_high)` offsets.
    pub fn derive(mode: RadioMode, delta_low: i32, delta_high: i32, cw_pitch_hz: i32) -> Self {
        let (low, high) = match mode {
            RadioMode::USB => (LOW_CUT_SSB_HZ + delta_low, HIGH_CUT_SSB_HZ + delta_high),
            RadioMode::LSB => (-HIGH_CUT_SSB_HZ - delta_high, -LOW_CUT_SSB_HZ - delta_low),
            RadioMode::AM | RadioMode::NFM => {
                (-HIGHLOW_CUT_AM_HZ - delta_low, HIGHLOW_CUT_AM_HZ + delta_high)
            }
            RadioMode::CW => (
                cw_pitch_hz - CW_HALF_WIDTH_HZ + delta_low,
                cw_pitch_hz + CW_HALF_WIDTH_HZ + delta_high,
            ),
        };
        Self::ordered(mode, low, high)
    }

    /// Fine adjustment: like [`Passband::derive`], but sideband modes never
    /// widen past the default SSB audio range.
    pub fn derive_clamped(
        mode: RadioMode,
        delta_low: i32,
        delta_high: i32,
        cw_pitch_hz: i32,
    ) -> Self {
        let pb = Self::derive(mode, delta_low, delta_high, cw_pitch_hz);
        let (low, high) = match mode {
            RadioMode::USB => (
                pb.low_cut_hz.max(LOW_CUT_SSB_HZ),
                pb.high_cut_hz.min(HIGH_CUT_SSB_HZ),
            ),
            RadioMode::LSB => (
                pb.low_cut_hz.max(-HIGH_CUT_SSB_HZ),
                pb.high_cut_hz.min(-LOW_CUT_SSB_HZ),
            ),
            _ => (pb.low_cut_hz, pb.high_cut_hz),
        };
        Self::ordered(mode, low, high)
    }

    pub fn default_for(mode: RadioMode) -> Self {
        Self::derive(mode, 0, 0, DEFAULT_CW_PITCH_HZ)
    }

    pub fn width_hz(&self) -> i32 {
        self.high_cut_hz - self.low_cut_hz
    }

    fn ordered(mode: RadioMode, low: i32, high: i32) -> Self {
        let high = if low < high {
            high
        } else {
            low + MIN_PASSBAND_WIDTH_HZ
        };
        Self {
            mode,
            low_cut_hz: low,
            high_cut_hz: high,
        }
    }
}
