// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Waterfall coordinate system, intensity scaling and row buffering.

pub mod history;
pub mod limits;
pub mod scale;
pub mod tuning;

pub use history::{Averager, RowHistory, SpectrumRow};
pub use limits::{LimitOverrides, ServerLimits};
pub use scale::{spectrum_db2col, ScaleState};
pub use tuning::{Divisions, Tuning};
