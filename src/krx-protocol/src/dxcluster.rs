// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! DX cluster telnet lines.

use krx_core::ParseError;

pub const DEFAULT_DXCLUSTER_HOST: &str = "dxfun.com";
pub const DEFAULT_DXCLUSTER_PORT: u16 = 8000;

/// Substring identifying a spot announcement.
pub const SPOT_MARKER: &str = "DX de ";
/// Backspace + newline, answered by the cluster with its prompt.
pub const KEEPALIVE: &str = "\u{8}\n";
const BEL: char = '\u{7}';
/// Lines longer than this without a newline are discarded.
pub const MAX_LINE_BYTES: usize = 4096;

pub fn login_line(callsign: &str) -> String {
    format!("{}\n", callsign.trim())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLine {
    pub spotter: String,
    pub freq_khz: f64,
    pub callsign: String,
    pub fields: Vec<String>,
}

/// Parse one line containing [`SPOT_MARKER`]. Fields are separated by runs of
/// two or more spaces.
pub fn parse_spot_line(line: &str) -> Result<SpotLine, ParseError> {
    let start = line
        .find(SPOT_MARKER)
        .ok_or_else(|| ParseError::SpotLine(line.to_string()))?;
    let fields: Vec<String> = line[start..]
        .split("  ")
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if fields.len() < 3 {
        return Err(ParseError::SpotLine(line.to_string()));
    }

    let spotter = fields[0]
        .trim_start_matches(SPOT_MARKER.trim_end())
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    let freq_khz: f64 = fields[1]
        .parse()
        .map_err(|_| ParseError::SpotLine(line.to_string()))?;
    let callsign = fields[2]
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();
    if callsign.is_empty() || !freq_khz.is_finite() || freq_khz <= 0.0 {
        return Err(ParseError::SpotLine(line.to_string()));
    }

    Ok(SpotLine {
        spotter,
        freq_khz,
        callsign,
        fields,
    })
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line, BEL characters removed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line: String = String::from_utf8_lossy(&raw)
                .chars()
                .filter(|c| *c != BEL && *c != '\r' && *c != '\n')
                .collect();
            lines.push(line);
        }
        if self.pending.len() > MAX_LINE_BYTES {
            self.pending.clear();
        }
        lines
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

pub fn is_spot_line(line: &str) -> bool {
    line.contains(SPOT_MARKER)
}
