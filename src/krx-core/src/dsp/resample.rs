// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Rational polyphase resampler.
//!
//! Conceptually the input is zero-stuffed by `up`, low-pass filtered at the
//! upsampled rate and decimated by `down`. Only the taps that land on real
//! input samples are evaluated, so the cost per output sample is
//! `taps / up`. Filter history is carried across calls so consecutive frames
//! join without clicks.

use super::filter::FilterKernel;

/// Upper bound on taps evaluated per output sample.
const MAX_TAPS_PER_PHASE: usize = 256;

pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// `(up, down)` such that `out_rate / in_rate == up / down` in lowest terms.
pub fn reduced_ratio(in_rate: u32, out_rate: u32) -> (usize, usize) {
    if in_rate == 0 || out_rate == 0 {
        return (1, 1);
    }
    let g = gcd(in_rate as u64, out_rate as u64).max(1);
    ((out_rate as u64 / g) as usize, (in_rate as u64 / g) as usize)
}

#[derive(Debug, Clone)]
pub struct Resampler {
    in_rate: u32,
    out_rate: u32,
    up: usize,
    down: usize,
    taps: Vec<f32>,
    history: Vec<f32>,
    history_len: usize,
    next_t: usize,
}

impl Resampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Self {
        let (up, down) = reduced_ratio(in_rate, out_rate);
        let upsampled_rate = in_rate.saturating_mul(up as u32).max(1);
        let natural_len = super::filter::kernel_len(upsampled_rate);
        let len = natural_len.min(up * MAX_TAPS_PER_PHASE + 1);
        let kernel = FilterKernel::with_len(upsampled_rate, len);
        let cutoff_hz = in_rate.min(out_rate) as f32 / 2.0;
        let gain = up as f32;
        let taps: Vec<f32> = kernel
            .lowpass(cutoff_hz)
            .into_iter()
            .map(|t| t * gain)
            .collect();
        let history_len = taps.len().div_ceil(up);
        Self {
            in_rate,
            out_rate,
            up,
            down,
            taps,
            history: vec![0.0; history_len],
            history_len,
            next_t: history_len * up,
        }
    }

    pub fn ratio(&self) -> (usize, usize) {
        (self.up, self.down)
    }

    pub fn rates(&self) -> (u32, u32) {
        (self.in_rate, self.out_rate)
    }

    pub fn is_passthrough(&self) -> bool {
        self.up == 1 && self.down == 1
    }

    /// Resample one frame, returning every output sample it completes.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }

        self.history.extend_from_slice(input);
        let len = self.history.len();
        let end = len * self.up;
        let mut out = Vec::with_capacity(input.len() * self.up / self.down + 1);

        while self.next_t < end {
            let t = self.next_t;
            let mut k = t % self.up;
            let mut j = t / self.up;
            let mut acc = 0.0f32;
            while k < self.taps.len() {
                acc += self.taps[k] * self.history[j];
                if j == 0 {
                    break;
                }
                k += self.up;
                j -= 1;
            }
            out.push(acc);
            self.next_t += self.down;
        }

        let consumed = len.saturating_sub(self.history_len);
        self.history.drain(..consumed);
        self.next_t -= consumed * self.up;
        out
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.history.resize(self.history_len, 0.0);
        self.next_t = self.history_len * self.up;
    }
}
