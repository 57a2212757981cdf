// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire formats spoken by krx-rs.
//!
//! Covers the websocket subset used by the SDR server, its control lines and
//! binary frames, the `/status` text page, the rigctl line protocol and DX
//! cluster spot lines.

pub mod commands;
pub mod dxcluster;
pub mod endpoint;
pub mod frames;
pub mod rigctl;
pub mod status;
pub mod ws;

pub use commands::{AgcParams, ControlMessage, NoiseBlanker, NoiseReduction};
pub use endpoint::ServerEndpoint;
pub use frames::{ServerMessage, SoundFrame, WaterfallFrame};
pub use status::ServerStatus;
pub use ws::{Message, WsReader, WsWriter};
