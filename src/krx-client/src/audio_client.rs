// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Receiver audio stream: handshake, PCM decode, resampling and the
//! playback queue hand-off.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use krx_core::dsp::Resampler;
use krx_core::playback::PlaybackQueue;
use krx_core::radio::passband::DEFAULT_CW_PITCH_HZ;
use krx_core::session::{unix_now, SessionClock};
use krx_core::{ConnectError, LinkError, Passband, RadioMode};
use krx_protocol::commands::audio_opening;
use krx_protocol::endpoint::SOUND_STREAM;
use krx_protocol::frames::{self, SOUND_TAG};
use krx_protocol::{
    AgcParams, ControlMessage, NoiseBlanker, NoiseReduction, ServerEndpoint, ServerMessage,
    ServerStatus, SoundFrame,
};

use crate::link::{self, FrameHandler, Link, PendingLink};
use crate::recorder::{RecordingError, RecordingSink};
use crate::status_probe;

pub const DEFAULT_INPUT_RATE: u32 = 12_000;
pub const DEFAULT_OUTPUT_RATE: u32 = 48_000;
pub const DEFAULT_QUEUE_LEN: usize = 8;
pub const MAX_VOLUME_PCT: u16 = 200;

#[derive(Debug, Clone)]
pub struct AudioOptions {
    pub freq_khz: f64,
    pub mode: RadioMode,
    pub delta_low_hz: i32,
    pub delta_high_hz: i32,
    pub cw_pitch_hz: i32,
    /// `None` picks the defaults for `mode`.
    pub agc: Option<AgcParams>,
    /// Rate requested from the server; the server may correct it.
    pub input_rate: u32,
    pub output_rate: u32,
    /// 1 (mono) or 2 (mono duplicated to both channels).
    pub channels: u16,
    pub queue_len: usize,
    /// Frames coalesced into one playback chunk.
    pub chunks: usize,
    pub volume_pct: u16,
    pub recording_dir: PathBuf,
    pub probe_status: bool,
    pub connect_timeout: Duration,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            freq_khz: 14_200.0,
            mode: RadioMode::USB,
            delta_low_hz: 0,
            delta_high_hz: 0,
            cw_pitch_hz: DEFAULT_CW_PITCH_HZ,
            agc: None,
            input_rate: DEFAULT_INPUT_RATE,
            output_rate: DEFAULT_OUTPUT_RATE,
            channels: 2,
            queue_len: DEFAULT_QUEUE_LEN,
            chunks: 1,
            volume_pct: 100,
            recording_dir: PathBuf::from("."),
            probe_status: true,
            connect_timeout: link::CONNECT_TIMEOUT,
        }
    }
}

fn to_i16(v: f32) -> i16 {
    v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Apply volume and, for stereo output, left/right balance in `[-1, 1]`.
/// Stereo output interleaves the mono signal into both channels.
pub fn mix(mono: &[i16], channels: u16, volume_pct: u16, balance: f32) -> Vec<i16> {
    let gain = volume_pct.min(MAX_VOLUME_PCT) as f32 / 100.0;
    if channels < 2 {
        return mono.iter().map(|s| to_i16(*s as f32 * gain)).collect();
    }
    let balance = balance.clamp(-1.0, 1.0);
    let left = gain * (1.0 - balance).min(1.0);
    let right = gain * (1.0 + balance).min(1.0);
    let mut out = Vec::with_capacity(mono.len() * 2);
    for s in mono {
        out.push(to_i16(*s as f32 * left));
        out.push(to_i16(*s as f32 * right));
    }
    out
}

/// Caller-steered tuning, written only through the setters.
#[derive(Debug, Clone)]
struct Controls {
    freq_khz: f64,
    mode: RadioMode,
    delta_low_hz: i32,
    delta_high_hz: i32,
    cw_pitch_hz: i32,
    passband: Passband,
    agc: AgcParams,
}

impl Controls {
    fn tune_line(&self) -> ControlMessage {
        ControlMessage::Tune {
            mode: self.mode,
            low_cut_hz: self.passband.low_cut_hz,
            high_cut_hz: self.passband.high_cut_hz,
            freq_khz: self.freq_khz,
        }
    }
}

/// Written by the receive task, read by the caller.
#[derive(Debug)]
struct OutputState {
    volume_pct: u16,
    balance: f32,
    rssi_dbm: f32,
    input_rate: u32,
    drift_hz: f64,
    frames: u64,
    recording: Option<RecordingSink>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct AudioHandler {
    resampler: Resampler,
    output_rate: u32,
    channels: u16,
    chunks: usize,
    pending: Vec<i16>,
    pending_frames: usize,
    last_sequence: Option<u32>,
    queue: Arc<PlaybackQueue>,
    output: Arc<Mutex<OutputState>>,
}

impl AudioHandler {
    fn on_sound(&mut self, frame: SoundFrame) {
        if let Some(prev) = self.last_sequence {
            if frame.sequence != prev.wrapping_add(1) {
                debug!("SND sequence jump {} -> {}", prev, frame.sequence);
            }
        }
        self.last_sequence = Some(frame.sequence);

        let input: Vec<f32> = frame.samples.iter().map(|s| *s as f32).collect();
        self.pending
            .extend(self.resampler.process(&input).into_iter().map(to_i16));
        self.pending_frames += 1;

        let (chunk, volume_pct, balance) = {
            let mut out = lock(&self.output);
            out.rssi_dbm = frame.rssi_dbm();
            out.frames += 1;
            if self.pending_frames < self.chunks {
                return;
            }
            let chunk = std::mem::take(&mut self.pending);
            self.pending_frames = 0;
            if let Some(rec) = out.recording.as_mut() {
                rec.append(&chunk);
            }
            (chunk, out.volume_pct, out.balance)
        };

        if self
            .queue
            .push(mix(&chunk, self.channels, volume_pct, balance))
            .is_some()
        {
            debug!("Playback queue full, dropped oldest chunk");
        }
    }

    fn on_audio_init(&mut self, rate: u32, true_rate: Option<f64>) {
        if rate == 0 {
            return;
        }
        let mut out = lock(&self.output);
        out.drift_hz = true_rate.map(|t| t - rate as f64).unwrap_or(0.0);
        if rate != out.input_rate {
            info!("Server audio rate now {} Hz", rate);
            out.input_rate = rate;
            self.resampler = Resampler::new(rate, self.output_rate);
        }
    }
}

impl FrameHandler for AudioHandler {
    fn on_payload(&mut self, payload: &[u8]) {
        match frames::tag(payload) {
            Some(tag) if tag == SOUND_TAG => match SoundFrame::parse(payload) {
                Ok(frame) => self.on_sound(frame),
                Err(e) => debug!("Discarding SND frame: {}", e),
            },
            _ => {
                if let Some((rate, true_rate)) =
                    ServerMessage::parse(payload).and_then(|m| m.audio_rates())
                {
                    self.on_audio_init(rate, true_rate);
                }
            }
        }
    }
}

/// Demodulated audio from one SDR server.
pub struct AudioStream {
    endpoint: ServerEndpoint,
    timestamp: u64,
    status: Option<ServerStatus>,
    output_rate: u32,
    channels: u16,
    recording_dir: PathBuf,
    controls: Mutex<Controls>,
    output: Arc<Mutex<OutputState>>,
    queue: Arc<PlaybackQueue>,
    link: Link,
}

impl AudioStream {
    /// Connect the audio endpoint. The handshake timestamp is shared with
    /// the waterfall through `clock` when it is recent enough.
    pub async fn connect(
        endpoint: ServerEndpoint,
        clock: &SessionClock,
        opts: AudioOptions,
    ) -> Result<Self, ConnectError> {
        let status = if opts.probe_status {
            status_probe::preflight(&endpoint).await?
        } else {
            None
        };

        let controls = Controls {
            freq_khz: opts.freq_khz,
            mode: opts.mode,
            delta_low_hz: opts.delta_low_hz,
            delta_high_hz: opts.delta_high_hz,
            cw_pitch_hz: opts.cw_pitch_hz,
            passband: Passband::derive(
                opts.mode,
                opts.delta_low_hz,
                opts.delta_high_hz,
                opts.cw_pitch_hz,
            ),
            agc: opts.agc.unwrap_or_else(|| AgcParams::for_mode(opts.mode)),
        };

        let timestamp = clock.reuse_or_mint(unix_now());
        let path = ServerEndpoint::stream_path(timestamp, SOUND_STREAM);
        let (mut reader, mut writer) = link::open(&endpoint, &path, opts.connect_timeout).await?;

        link::send_all(
            &mut writer,
            &audio_opening(
                &endpoint.password,
                controls.mode,
                controls.passband.low_cut_hz,
                controls.passband.high_cut_hz,
                controls.freq_khz,
                controls.agc,
                opts.input_rate,
                opts.output_rate,
            ),
        )
        .await?;

        let mut rates = None;
        let first = link::await_stream_tag(
            &mut reader,
            &mut writer,
            SOUND_TAG,
            link::HANDSHAKE_TIMEOUT,
            |msg| {
                if let Some(r) = msg.audio_rates() {
                    rates = Some(r);
                }
            },
        )
        .await?;

        let input_rate = rates
            .map(|(rate, _)| rate)
            .filter(|rate| *rate > 0)
            .unwrap_or(opts.input_rate);
        let drift_hz = rates
            .and_then(|(rate, true_rate)| true_rate.map(|t| t - rate as f64))
            .unwrap_or(0.0);
        let resampler = Resampler::new(input_rate, opts.output_rate);
        info!(
            "Audio up: {} Hz -> {} Hz (ratio {:?}), drift {:+.3} Hz",
            input_rate,
            opts.output_rate,
            resampler.ratio(),
            drift_hz
        );

        let output = Arc::new(Mutex::new(OutputState {
            volume_pct: opts.volume_pct.min(MAX_VOLUME_PCT),
            balance: 0.0,
            rssi_dbm: -127.0,
            input_rate,
            drift_hz,
            frames: 0,
            recording: None,
        }));
        let queue = Arc::new(PlaybackQueue::new(opts.queue_len));
        let channels = opts.channels.clamp(1, 2);
        let mut handler = AudioHandler {
            resampler,
            output_rate: opts.output_rate,
            channels,
            chunks: opts.chunks.max(1),
            pending: Vec::new(),
            pending_frames: 0,
            last_sequence: None,
            queue: queue.clone(),
            output: output.clone(),
        };
        handler.on_payload(&first);

        let link = Link::spawn("SND", PendingLink::new(), reader, writer, handler);

        Ok(Self {
            endpoint,
            timestamp,
            status,
            output_rate: opts.output_rate,
            channels,
            recording_dir: opts.recording_dir,
            controls: Mutex::new(controls),
            output,
            queue,
            link,
        })
    }

    fn retune(&self, update: impl FnOnce(&mut Controls) -> bool) -> Result<Passband, LinkError> {
        let (tune, agc, passband) = {
            let mut c = lock(&self.controls);
            let agc_changed = update(&mut c);
            (c.tune_line(), agc_changed.then_some(c.agc), c.passband)
        };
        self.link.send(tune)?;
        if let Some(agc) = agc {
            self.link.send(ControlMessage::Agc(agc))?;
        }
        Ok(passband)
    }

    /// Retune with the current passband deltas re-applied for `mode`.
    pub fn set_mode_freq_passband(
        &self,
        freq_khz: f64,
        mode: RadioMode,
    ) -> Result<Passband, LinkError> {
        self.retune(|c| {
            let was_cw = c.mode == RadioMode::CW;
            c.freq_khz = freq_khz;
            c.mode = mode;
            c.passband = Passband::derive(mode, c.delta_low_hz, c.delta_high_hz, c.cw_pitch_hz);
            // CW uses a faster AGC decay.
            if was_cw != (mode == RadioMode::CW) {
                c.agc.decay_ms = AgcParams::for_mode(mode).decay_ms;
                true
            } else {
                false
            }
        })
    }

    pub fn set_freq(&self, freq_khz: f64) -> Result<Passband, LinkError> {
        let mode = lock(&self.controls).mode;
        self.set_mode_freq_passband(freq_khz, mode)
    }

    /// Set the passband deltas for the current mode.
    pub fn set_passband(&self, delta_low_hz: i32, delta_high_hz: i32) -> Result<Passband, LinkError> {
        self.retune(|c| {
            c.delta_low_hz = delta_low_hz;
            c.delta_high_hz = delta_high_hz;
            c.passband = Passband::derive(c.mode, delta_low_hz, delta_high_hz, c.cw_pitch_hz);
            false
        })
    }

    /// Fine passband adjustment; sideband modes stay inside the default
    /// SSB audio range.
    pub fn change_passband(
        &self,
        delta_low_hz: i32,
        delta_high_hz: i32,
    ) -> Result<Passband, LinkError> {
        self.retune(|c| {
            c.delta_low_hz = delta_low_hz;
            c.delta_high_hz = delta_high_hz;
            c.passband =
                Passband::derive_clamped(c.mode, delta_low_hz, delta_high_hz, c.cw_pitch_hz);
            false
        })
    }

    pub fn set_agc(&self, agc: AgcParams) -> Result<(), LinkError> {
        lock(&self.controls).agc = agc;
        self.link.send(ControlMessage::Agc(agc))
    }

    pub fn set_noise_blanker(&self, nb: NoiseBlanker) -> Result<(), LinkError> {
        self.link.send(ControlMessage::NoiseBlanker(nb))
    }

    pub fn set_noise_reduction(&self, nr: NoiseReduction) -> Result<(), LinkError> {
        self.link.send(ControlMessage::NoiseReduction(nr))
    }

    pub fn set_attenuation(&self, db: u32) -> Result<(), LinkError> {
        self.link.send(ControlMessage::Attenuation(db))
    }

    pub fn set_volume(&self, pct: u16) {
        lock(&self.output).volume_pct = pct.min(MAX_VOLUME_PCT);
    }

    pub fn set_balance(&self, balance: f32) {
        lock(&self.output).balance = balance.clamp(-1.0, 1.0);
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn status(&self) -> Option<&ServerStatus> {
        self.status.as_ref()
    }

    pub fn freq_offset_khz(&self) -> f64 {
        self.status
            .as_ref()
            .map(ServerStatus::freq_offset_khz)
            .unwrap_or(0.0)
    }

    pub fn freq_khz(&self) -> f64 {
        lock(&self.controls).freq_khz
    }

    pub fn mode(&self) -> RadioMode {
        lock(&self.controls).mode
    }

    pub fn passband(&self) -> Passband {
        lock(&self.controls).passband
    }

    pub fn agc(&self) -> AgcParams {
        lock(&self.controls).agc
    }

    pub fn volume_pct(&self) -> u16 {
        lock(&self.output).volume_pct
    }

    /// Latest S-meter reading.
    pub fn rssi_dbm(&self) -> f32 {
        lock(&self.output).rssi_dbm
    }

    /// Server's fractional true rate minus its nominal rate.
    pub fn drift_hz(&self) -> f64 {
        lock(&self.output).drift_hz
    }

    pub fn input_rate(&self) -> u32 {
        lock(&self.output).input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames_received(&self) -> u64 {
        lock(&self.output).frames
    }

    /// Consumer side of the playback queue, for the output callback.
    pub fn queue(&self) -> Arc<PlaybackQueue> {
        self.queue.clone()
    }

    /// Fill an output buffer without blocking; silence when empty.
    pub fn fill(&self, out: &mut [i16]) -> usize {
        self.queue.fill(out)
    }

    /// Whether enough audio is buffered to start output.
    pub fn is_prefilled(&self) -> bool {
        self.queue.is_full()
    }

    /// Returns `false` if a recording is already running.
    pub fn start_recording(&self) -> bool {
        let mut out = lock(&self.output);
        if out.recording.is_some() {
            return false;
        }
        out.recording = Some(RecordingSink::start(&self.recording_dir, self.output_rate));
        true
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.output).recording.is_some()
    }

    /// Stop and write the recording. `Ok(None)` if none was running.
    pub fn stop_recording(&self) -> Result<Option<PathBuf>, RecordingError> {
        let sink = lock(&self.output).recording.take();
        sink.map(RecordingSink::finish).transpose()
    }

    pub fn recording_dir(&self) -> &Path {
        &self.recording_dir
    }

    pub fn is_terminal(&self) -> bool {
        self.link.is_terminal()
    }

    pub async fn shutdown(&mut self) {
        self.link.shutdown().await;
    }
}
