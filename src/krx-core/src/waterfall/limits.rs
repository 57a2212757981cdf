// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FREQ_KHZ: f64 = 30_000.0;
pub const DEFAULT_MAX_ZOOM: u32 = 14;
pub const DEFAULT_BINS: usize = 1024;
pub const DEFAULT_MAX_FPS: u32 = 23;

/// Server-side waterfall limits.
///
/// Starts from compiled-in defaults; the values reported by the server during
/// the handshake are merged on top and always win.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerLimits {
    pub max_freq_khz: f64,
    pub max_zoom: u32,
    pub bins: usize,
    pub max_fps: u32,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_freq_khz: DEFAULT_MAX_FREQ_KHZ,
            max_zoom: DEFAULT_MAX_ZOOM,
            bins: DEFAULT_BINS,
            max_fps: DEFAULT_MAX_FPS,
        }
    }
}

/// Values reported by the server; `None` keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LimitOverrides {
    pub max_freq_khz: Option<f64>,
    pub max_zoom: Option<u32>,
    pub bins: Option<usize>,
    pub max_fps: Option<u32>,
}

impl LimitOverrides {
    pub fn is_empty(&self) -> bool {
        self.max_freq_khz.is_none()
            && self.max_zoom.is_none()
            && self.bins.is_none()
            && self.max_fps.is_none()
    }
}

impl ServerLimits {
    pub fn merge(&self, overrides: &LimitOverrides) -> ServerLimits {
        ServerLimits {
            max_freq_khz: overrides
                .max_freq_khz
                .filter(|f| *f > 0.0)
                .unwrap_or(self.max_freq_khz),
            max_zoom: overrides.max_zoom.unwrap_or(self.max_zoom),
            bins: overrides.bins.filter(|b| *b > 0).unwrap_or(self.bins),
            max_fps: overrides.max_fps.unwrap_or(self.max_fps),
        }
    }

    pub fn center_freq_khz(&self) -> f64 {
        self.max_freq_khz / 2.0
    }
}
