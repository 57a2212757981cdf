// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Center/zoom coordinate system of the waterfall.

use super::limits::ServerLimits;

/// Minimum distance in bins between two labelled divisions.
pub const DEFAULT_MIN_BIN_SPACING: f64 = 100.0;

/// Current waterfall tuning. Span, start and end are always derived from
/// `(center, zoom)` against the active [`ServerLimits`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    limits: ServerLimits,
    center_khz: f64,
    zoom: u32,
    span_khz: f64,
    start_khz: f64,
    end_khz: f64,
    counter: u64,
    actual_start_khz: f64,
}

/// Tick positions, in bins from the left edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Divisions {
    pub spacing_khz: u64,
    pub major: Vec<(usize, u64)>,
    pub minor: Vec<usize>,
}

impl Tuning {
    pub fn new(limits: ServerLimits, center_khz: f64, zoom: u32) -> Self {
        let mut tuning = Self {
            limits,
            center_khz: limits.center_freq_khz(),
            zoom: 0,
            span_khz: limits.max_freq_khz,
            start_khz: 0.0,
            end_khz: limits.max_freq_khz,
            counter: 0,
            actual_start_khz: 0.0,
        };
        tuning.set_freq_zoom(center_khz, zoom);
        tuning
    }

    pub fn limits(&self) -> &ServerLimits {
        &self.limits
    }

    /// Swap in new server limits and re-derive the window.
    pub fn set_limits(&mut self, limits: ServerLimits) {
        self.limits = limits;
        let (center, zoom) = (self.center_khz, self.zoom);
        self.set_freq_zoom(center, zoom);
    }

    /// Set center and zoom. Zoom is clamped to the server maximum; zoom 0
    /// always shows the full band and any other zoom slides the window back
    /// inside `[0, max_freq]`. Returns the effective center.
    pub fn set_freq_zoom(&mut self, freq_khz: f64, zoom: u32) -> f64 {
        let max = self.limits.max_freq_khz;
        let zoom = zoom.min(self.limits.max_zoom);
        let span = max / 2f64.powi(zoom as i32);

        let center = if zoom == 0 {
            self.limits.center_freq_khz()
        } else if freq_khz - span / 2.0 < 0.0 {
            span / 2.0
        } else if freq_khz + span / 2.0 > max {
            max - span / 2.0
        } else {
            freq_khz
        };

        self.zoom = zoom;
        self.center_khz = center;
        self.span_khz = span;
        self.start_khz = center - span / 2.0;
        self.end_khz = center + span / 2.0;

        let scale = 2f64.powi(self.limits.max_zoom as i32) * self.limits.bins as f64;
        self.counter = (self.start_khz / max * scale).round().max(0.0) as u64;
        self.actual_start_khz = self.counter as f64 * max / scale;
        center
    }

    pub fn center_khz(&self) -> f64 {
        self.center_khz
    }

    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    pub fn span_khz(&self) -> f64 {
        self.span_khz
    }

    pub fn start_khz(&self) -> f64 {
        self.start_khz
    }

    pub fn end_khz(&self) -> f64 {
        self.end_khz
    }

    /// Start position quantised to the server's bin grid, as sent in
    /// `SET zoom=.. start=..`.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn actual_start_khz(&self) -> f64 {
        self.actual_start_khz
    }

    pub fn bins_per_khz(&self) -> f64 {
        self.limits.bins as f64 / self.span_khz
    }

    pub fn offset_to_bin(&self, offset_khz: f64) -> f64 {
        self.limits.bins as f64 * offset_khz / self.span_khz
    }

    pub fn bin_to_khz(&self, bin: f64) -> f64 {
        self.delta_bins_to_khz(bin) + self.start_khz
    }

    pub fn delta_bins_to_khz(&self, bins: f64) -> f64 {
        bins * self.span_khz / self.limits.bins as f64
    }

    pub fn khz_to_bin(&self, freq_khz: f64) -> Option<usize> {
        if freq_khz < self.start_khz || freq_khz >= self.end_khz {
            return None;
        }
        Some(self.offset_to_bin(freq_khz - self.start_khz) as usize)
    }

    /// Division ticks for the current window. Spacing starts at 10 kHz and
    /// grows by ten until the ticks are at least `min_bin_spacing` bins apart
    /// and at least one falls inside the window.
    pub fn divisions(&self, min_bin_spacing: f64) -> Divisions {
        let bins_per_khz = self.bins_per_khz();
        let first = self.start_khz.ceil().max(0.0) as u64;
        let last = self.end_khz.floor().max(0.0) as u64;
        let ceiling = (self.limits.max_freq_khz as u64).max(10) * 10;

        let mut space = 10u64;
        loop {
            let mut divs = Divisions {
                spacing_khz: space,
                ..Divisions::default()
            };
            if bins_per_khz * space as f64 > min_bin_spacing {
                for f in multiples(first, last, space) {
                    divs.major.push((self.bin_of(f), f));
                }
                for f in multiples(first, last, space / 10) {
                    if f % space != 0 {
                        divs.minor.push(self.bin_of(f));
                    }
                }
            }
            if !divs.major.is_empty() || !divs.minor.is_empty() || space >= ceiling {
                return divs;
            }
            space *= 10;
        }
    }

    fn bin_of(&self, freq_khz: u64) -> usize {
        self.offset_to_bin(freq_khz as f64 - self.start_khz).max(0.0) as usize
    }
}

fn multiples(first: u64, last: u64, step: u64) -> impl Iterator<Item = u64> {
    let step = step.max(1);
    let start = first.div_ceil(step) * step;
    (start..=last).step_by(step as usize)
}
