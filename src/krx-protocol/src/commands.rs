// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `SET ...` control lines sent to the SDR server.

use std::fmt;

use krx_core::RadioMode;

pub const CLIENT_IDENT: &str = "krx-rs";
pub const INACTIVITY_TIMEOUT_OVERRIDE: u32 = 1000;

/// Automatic gain control parameters, forwarded verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgcParams {
    pub enabled: bool,
    pub hang: bool,
    pub threshold_db: i32,
    pub slope: i32,
    pub decay_ms: u32,
    pub manual_gain: i32,
}

impl AgcParams {
    pub const DEFAULT_DECAY_MS: u32 = 4000;
    pub const CW_DECAY_MS: u32 = 1000;

    pub fn for_mode(mode: RadioMode) -> Self {
        Self {
            decay_ms: if mode == RadioMode::CW {
                Self::CW_DECAY_MS
            } else {
                Self::DEFAULT_DECAY_MS
            },
            ..Self::default()
        }
    }
}

impl Default for AgcParams {
    fn default() -> Self {
        Self {
            enabled: true,
            hang: false,
            threshold_db: -80,
            slope: 0,
            decay_ms: Self::DEFAULT_DECAY_MS,
            manual_gain: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseBlanker {
    pub enabled: bool,
    pub threshold: u32,
    pub gate_us: u32,
}

impl Default for NoiseBlanker {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 50,
            gate_us: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseReduction {
    pub enabled: bool,
    pub log2n: u32,
    pub sigma: u32,
    pub gain: u32,
}

impl Default for NoiseReduction {
    fn default() -> Self {
        Self {
            enabled: false,
            log2n: 10,
            sigma: 50,
            gain: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Auth { password: String },
    Zoom { zoom: u32, start: u64 },
    DbRange { max_db: i32, min_db: i32 },
    WfSpeed(u32),
    WfComp(bool),
    Interp(u32),
    Keepalive,
    Tune {
        mode: RadioMode,
        low_cut_hz: i32,
        high_cut_hz: i32,
        freq_khz: f64,
    },
    Compression(bool),
    Ident(String),
    InactivityTimeout(u32),
    Agc(AgcParams),
    AudioRates { input: u32, output: u32 },
    NoiseBlanker(NoiseBlanker),
    NoiseReduction(NoiseReduction),
    Attenuation(u32),
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Auth { password } => {
                write!(f, "SET auth t=kiwi p={password} ipl={password}")
            }
            ControlMessage::Zoom { zoom, start } => write!(f, "SET zoom={zoom} start={start}"),
            ControlMessage::DbRange { max_db, min_db } => {
                write!(f, "SET maxdb={max_db} mindb={min_db}")
            }
            ControlMessage::WfSpeed(speed) => write!(f, "SET wf_speed={speed}"),
            ControlMessage::WfComp(on) => write!(f, "SET wf_comp={}", flag(*on)),
            ControlMessage::Interp(n) => write!(f, "SET interp={n}"),
            ControlMessage::Keepalive => write!(f, "SET keepalive"),
            ControlMessage::Tune {
                mode,
                low_cut_hz,
                high_cut_hz,
                freq_khz,
            } => write!(
                f,
                "SET mod={} low_cut={low_cut_hz} high_cut={high_cut_hz} freq={freq_khz:.3}",
                mode.wire_name()
            ),
            ControlMessage::Compression(on) => write!(f, "SET compression={}", flag(*on)),
            ControlMessage::Ident(name) => write!(f, "SET ident_user={name}"),
            ControlMessage::InactivityTimeout(secs) => {
                write!(f, "SET OVERRIDE inactivity_timeout={secs}")
            }
            ControlMessage::Agc(agc) => write!(
                f,
                "SET agc={} hang={} thresh={} slope={} decay={} manGain={}",
                flag(agc.enabled),
                flag(agc.hang),
                agc.threshold_db,
                agc.slope,
                agc.decay_ms,
                agc.manual_gain
            ),
            ControlMessage::AudioRates { input, output } => {
                write!(f, "SET AR OK in={input} out={output}")
            }
            ControlMessage::NoiseBlanker(nb) => write!(
                f,
                "SET nb={} thresh={} gate={}",
                flag(nb.enabled),
                nb.threshold,
                nb.gate_us
            ),
            ControlMessage::NoiseReduction(nr) => write!(
                f,
                "SET nr={} log2n={} sigma={} gain={}",
                flag(nr.enabled),
                nr.log2n,
                nr.sigma,
                nr.gain
            ),
            ControlMessage::Attenuation(db) => write!(f, "SET att={db}"),
        }
    }
}

/// Default waterfall display range requested at connect.
pub const DEFAULT_WF_MAX_DB: i32 = -10;
pub const DEFAULT_WF_MIN_DB: i32 = -110;
pub const DEFAULT_WF_SPEED: u32 = 4;
pub const DEFAULT_WF_INTERP: u32 = 13;

/// Ordered control lines that open a waterfall session.
pub fn waterfall_opening(password: &str, zoom: u32, start: u64) -> Vec<ControlMessage> {
    vec![
        ControlMessage::Auth {
            password: password.to_string(),
        },
        ControlMessage::Zoom { zoom, start },
        ControlMessage::DbRange {
            max_db: DEFAULT_WF_MAX_DB,
            min_db: DEFAULT_WF_MIN_DB,
        },
        ControlMessage::WfSpeed(DEFAULT_WF_SPEED),
        ControlMessage::WfComp(false),
        ControlMessage::Interp(DEFAULT_WF_INTERP),
    ]
}

/// Ordered control lines that open an audio session.
#[allow(clippy::too_many_arguments)]
pub fn audio_opening(
    password: &str,
    mode: RadioMode,
    low_cut_hz: i32,
    high_cut_hz: i32,
    freq_khz: f64,
    agc: AgcParams,
    input_rate: u32,
    output_rate: u32,
) -> Vec<ControlMessage> {
    vec![
        ControlMessage::Auth {
            password: password.to_string(),
        },
        ControlMessage::Tune {
            mode,
            low_cut_hz,
            high_cut_hz,
            freq_khz,
        },
        ControlMessage::Compression(false),
        ControlMessage::Ident(CLIENT_IDENT.to_string()),
        ControlMessage::InactivityTimeout(INACTIVITY_TIMEOUT_OVERRIDE),
        ControlMessage::Agc(agc),
        ControlMessage::AudioRates {
            input: input_rate,
            output: output_rate,
        },
    ]
}
