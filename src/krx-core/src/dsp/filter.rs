// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::f32::consts::PI;

/// Window length in milliseconds of signal at the kernel's sample rate.
const KERNEL_SPAN_MS: f64 = 10.0;

/// Kernel length for `sample_rate_hz`: 10 ms worth of samples, rounded and
/// forced odd so the kernel has a centre tap.
pub fn kernel_len(sample_rate_hz: u32) -> usize {
    let n = (KERNEL_SPAN_MS * sample_rate_hz as f64 / 1000.0).round() as usize;
    let n = n.max(3);
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

/// Blackman window of length `n`.
pub fn blackman(n: usize) -> Vec<f32> {
    if n == 1 {
        return vec![1.0];
    }
    let m = (n - 1) as f32;
    (0..n)
        .map(|i| {
            let x = i as f32 / m;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Fixed Blackman window used as the resampling low-pass kernel.
#[derive(Debug, Clone)]
pub struct FilterKernel {
    sample_rate_hz: u32,
    window: Vec<f32>,
}

impl FilterKernel {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self::with_len(sample_rate_hz, kernel_len(sample_rate_hz))
    }

    /// Build a kernel of explicit length (forced odd).
    pub fn with_len(sample_rate_hz: u32, len: usize) -> Self {
        let len = if len % 2 == 0 { len + 1 } else { len.max(1) };
        Self {
            sample_rate_hz,
            window: blackman(len),
        }
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Windowed-sinc low-pass taps with unity DC gain.
    ///
    /// `cutoff_hz` is relative to the kernel's sample rate.
    pub fn lowpass(&self, cutoff_hz: f32) -> Vec<f32> {
        let cutoff_norm = cutoff_hz / self.sample_rate_hz as f32;
        let taps = self.window.len();
        let m = (taps - 1) as f32;
        let mut coeffs: Vec<f32> = self
            .window
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let x = i as f32 - m / 2.0;
                let sinc = if x == 0.0 {
                    2.0 * cutoff_norm
                } else {
                    (2.0 * PI * cutoff_norm * x).sin() / (PI * x)
                };
                sinc * w
            })
            .collect();
        let sum: f32 = coeffs.iter().sum();
        if sum.abs() > 1e-12 {
            let inv = 1.0 / sum;
            for coeff in &mut coeffs {
                *coeff *= inv;
            }
        }
        coeffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_len_forced_odd() {
        assert_eq!(kernel_len(48_000), 481);
        assert_eq!(kernel_len(12_000), 121);
        assert_eq!(kernel_len(44_100), 441);
        assert_eq!(kernel_len(100), 3);
    }

    #[test]
    fn test_window_is_symmetric_and_peaks_in_middle() {
        let k = FilterKernel::new(12_000);
        let w = k.window();
        let n = w.len();
        for i in 0..n / 2 {
            assert!((w[i] - w[n - 1 - i]).abs() < 1e-5);
        }
        assert!((w[n / 2] - 1.0).abs() < 1e-5);
        assert!(w[0].abs() < 1e-5);
    }

    #[test]
    fn test_lowpass_unity_gain() {
        let k = FilterKernel::new(48_000);
        let taps = k.lowpass(6_000.0);
        let sum: f32 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert_eq!(taps.len(), 481);
    }
}
