// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod filter;
pub mod resample;

pub use filter::FilterKernel;
pub use resample::{reduced_ratio, Resampler};
