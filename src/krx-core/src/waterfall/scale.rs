// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Conversion of raw spectrum bytes into colour indices.

use serde::{Deserialize, Serialize};

pub const MIN_DYN_RANGE_DB: f32 = 40.0;
pub const CLIP_LOW_PERCENTILE: f32 = 40.0;
pub const CLIP_HIGH_PERCENTILE: f32 = 100.0;
pub const INITIAL_LOW_CLIP_DB: f32 = -120.0;
pub const INITIAL_HIGH_CLIP_DB: f32 = -60.0;

/// Highest colour index produced by [`spectrum_db2col`].
pub const MAX_COLOR_INDEX: f32 = 254.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleState {
    pub low_clip_db: f32,
    pub high_clip_db: f32,
    pub dynamic_range_db: f32,
    /// Track the clip levels from each row's percentiles.
    pub auto_scale: bool,
    /// User offset applied to the lower clip level.
    pub delta_low_db: f32,
    /// User offset applied to the upper clip level.
    pub delta_high_db: f32,
    /// Displayed dB range, zoom-compensated.
    pub wf_min_db: f32,
    pub wf_max_db: f32,
}

impl Default for ScaleState {
    fn default() -> Self {
        Self {
            low_clip_db: INITIAL_LOW_CLIP_DB,
            high_clip_db: INITIAL_HIGH_CLIP_DB,
            dynamic_range_db: INITIAL_HIGH_CLIP_DB - INITIAL_LOW_CLIP_DB,
            auto_scale: true,
            delta_low_db: 0.0,
            delta_high_db: 0.0,
            wf_min_db: INITIAL_LOW_CLIP_DB,
            wf_max_db: INITIAL_HIGH_CLIP_DB,
        }
    }
}

impl ScaleState {
    pub fn reset_deltas(&mut self) {
        self.delta_low_db = 0.0;
        self.delta_high_db = 0.0;
    }
}

/// Map a raw intensity byte to dB. The server biases the scale by 3 dB per
/// zoom step.
pub fn byte_to_db(raw: f32, zoom: u32) -> f32 {
    -(255.0 - raw) - 13.0 + 3.0 * zoom as f32
}

/// Linear-interpolated percentile of an already sorted slice.
fn percentile(sorted: &[f32], pct: f32) -> f32 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f32;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f32;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Convert one row of raw spectrum values (bytes, possibly averaged) into
/// colour indices `0..=254`.
///
/// Bin 0 carries DC garbage and is replaced by bin 1. With auto scaling on,
/// the clip levels come from the 40th and 100th percentiles of the row and the
/// range is widened to at least [`MIN_DYN_RANGE_DB`]. The displayed dB bounds
/// are written back into `scale`.
pub fn spectrum_db2col(raw: &[f32], zoom: u32, scale: &mut ScaleState) -> Vec<u8> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut db: Vec<f32> = raw.iter().map(|b| byte_to_db(*b, zoom)).collect();
    if db.len() > 1 {
        db[0] = db[1];
    }

    if scale.auto_scale {
        let mut sorted = db.clone();
        sorted.sort_by(f32::total_cmp);
        scale.low_clip_db = percentile(&sorted, CLIP_LOW_PERCENTILE);
        scale.high_clip_db = percentile(&sorted, CLIP_HIGH_PERCENTILE);
        scale.dynamic_range_db =
            (scale.high_clip_db - scale.low_clip_db).max(MIN_DYN_RANGE_DB);
    }

    let floor = scale.low_clip_db + scale.delta_low_db;
    let range = (scale.dynamic_range_db + scale.delta_high_db - scale.delta_low_db).max(1.0);
    let zoom_bias = 3.0 * zoom as f32;
    scale.wf_min_db = floor - zoom_bias;
    scale.wf_max_db = floor + range - zoom_bias;

    db.iter()
        .map(|v| {
            let norm = ((v - floor) / range).clamp(0.0, 1.0);
            (norm * MAX_COLOR_INDEX).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}
