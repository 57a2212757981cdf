// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod dsp;
pub mod error;
pub mod memory;
pub mod playback;
pub mod radio;
pub mod rig;
pub mod session;
pub mod spot;
pub mod waterfall;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use error::{ConnectError, LinkError, ParseError, ProtocolError};
pub use radio::mode::RadioMode;
pub use radio::passband::Passband;
pub use rig::RigState;
