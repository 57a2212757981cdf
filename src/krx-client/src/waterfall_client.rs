// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Spectrum stream: handshake, tuning and row decoding.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use krx_core::session::{unix_now, SessionClock};
use krx_core::waterfall::history::DEFAULT_HISTORY_ROWS;
use krx_core::waterfall::tuning::DEFAULT_MIN_BIN_SPACING;
use krx_core::waterfall::{
    spectrum_db2col, Averager, Divisions, RowHistory, ScaleState, ServerLimits, SpectrumRow,
    Tuning,
};
use krx_core::{ConnectError, LinkError};
use krx_protocol::commands::waterfall_opening;
use krx_protocol::endpoint::WATERFALL_STREAM;
use krx_protocol::frames::{self, WATERFALL_TAG};
use krx_protocol::{ControlMessage, ServerEndpoint, ServerMessage, ServerStatus, WaterfallFrame};

use crate::link::{self, FrameHandler, Link, Outbox, PendingLink};
use crate::status_probe;

#[derive(Debug, Clone)]
pub struct WaterfallOptions {
    pub zoom: u32,
    /// `None` centres on the middle of the band.
    pub center_khz: Option<f64>,
    pub averaging: usize,
    pub history_rows: usize,
    pub auto_scale: bool,
    pub probe_status: bool,
    pub connect_timeout: Duration,
}

impl Default for WaterfallOptions {
    fn default() -> Self {
        Self {
            zoom: 8,
            center_khz: None,
            averaging: 1,
            history_rows: DEFAULT_HISTORY_ROWS,
            auto_scale: true,
            probe_status: true,
            connect_timeout: link::CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug)]
struct WaterfallState {
    tuning: Tuning,
    scale: ScaleState,
    averager: Averager,
    history: RowHistory,
    rows: u64,
    last_sequence: Option<u32>,
}

impl WaterfallState {
    fn new(limits: ServerLimits, center_khz: f64, opts: &WaterfallOptions) -> Self {
        Self {
            tuning: Tuning::new(limits, center_khz, opts.zoom),
            scale: ScaleState {
                auto_scale: opts.auto_scale,
                ..ScaleState::default()
            },
            averager: Averager::new(opts.averaging),
            history: RowHistory::new(opts.history_rows),
            rows: 0,
            last_sequence: None,
        }
    }

    fn ingest(&mut self, frame: &WaterfallFrame) {
        if let Some(prev) = self.last_sequence {
            if frame.sequence != prev.wrapping_add(1) {
                debug!("W/F sequence jump {} -> {}", prev, frame.sequence);
            }
        }
        self.last_sequence = Some(frame.sequence);

        if let Some(mean) = self.averager.push(&frame.bins) {
            let row = spectrum_db2col(&mean, self.tuning.zoom(), &mut self.scale);
            self.history.push(row);
            self.rows += 1;
        }
    }

    /// Merge server limits; returns the zoom line to re-send if the
    /// bin counter moved.
    fn apply_limits(&mut self, msg: &ServerMessage) -> Option<ControlMessage> {
        let overrides = msg.limit_overrides();
        if overrides.is_empty() {
            return None;
        }
        let limits = self.tuning.limits().merge(&overrides);
        if &limits == self.tuning.limits() {
            return None;
        }
        info!(
            "Server limits: {} kHz, zoom 0..={}, {} bins, {} fps",
            limits.max_freq_khz, limits.max_zoom, limits.bins, limits.max_fps
        );
        let counter = self.tuning.counter();
        let zoom = self.tuning.zoom();
        self.tuning.set_limits(limits);
        (self.tuning.counter() != counter || self.tuning.zoom() != zoom).then(|| {
            ControlMessage::Zoom {
                zoom: self.tuning.zoom(),
                start: self.tuning.counter(),
            }
        })
    }
}

type Shared = Arc<Mutex<WaterfallState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, WaterfallState> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

struct WaterfallHandler {
    shared: Shared,
    outbox: Outbox,
}

impl WaterfallHandler {
    fn send(&self, msg: ControlMessage) -> bool {
        match self.outbox.control(msg) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropped W/F control line: {}", e);
                false
            }
        }
    }
}

impl FrameHandler for WaterfallHandler {
    fn on_payload(&mut self, payload: &[u8]) {
        match frames::tag(payload) {
            Some(tag) if tag == WATERFALL_TAG => match WaterfallFrame::parse(payload) {
                Ok(frame) => {
                    lock(&self.shared).ingest(&frame);
                    // The server drops clients that stop answering.
                    self.send(ControlMessage::Keepalive);
                }
                Err(e) => debug!("Discarding W/F frame: {}", e),
            },
            _ => {
                if let Some(msg) = ServerMessage::parse(payload) {
                    let resend = lock(&self.shared).apply_limits(&msg);
                    if let Some(zoom) = resend {
                        self.send(zoom);
                    }
                }
            }
        }
    }
}

/// Live spectrum from one SDR server.
///
/// Rows are decoded on the stream's own task; the caller reads snapshots.
pub struct WaterfallStream {
    endpoint: ServerEndpoint,
    timestamp: u64,
    status: Option<ServerStatus>,
    shared: Shared,
    link: Link,
}

impl WaterfallStream {
    pub async fn connect(
        endpoint: ServerEndpoint,
        clock: &SessionClock,
        opts: WaterfallOptions,
    ) -> Result<Self, ConnectError> {
        let status = if opts.probe_status {
            status_probe::preflight(&endpoint).await?
        } else {
            None
        };

        let limits = ServerLimits::default();
        let center = opts.center_khz.unwrap_or_else(|| limits.center_freq_khz());
        let mut state = WaterfallState::new(limits, center, &opts);

        let timestamp = clock.mint(unix_now());
        let path = ServerEndpoint::stream_path(timestamp, WATERFALL_STREAM);
        let (mut reader, mut writer) = link::open(&endpoint, &path, opts.connect_timeout).await?;

        let sent_zoom = state.tuning.zoom();
        let sent_counter = state.tuning.counter();
        link::send_all(
            &mut writer,
            &waterfall_opening(&endpoint.password, sent_zoom, sent_counter),
        )
        .await?;

        let first = link::await_stream_tag(
            &mut reader,
            &mut writer,
            WATERFALL_TAG,
            link::HANDSHAKE_TIMEOUT,
            |msg| {
                state.apply_limits(msg);
            },
        )
        .await?;

        if state.tuning.counter() != sent_counter || state.tuning.zoom() != sent_zoom {
            link::send_all(
                &mut writer,
                &[ControlMessage::Zoom {
                    zoom: state.tuning.zoom(),
                    start: state.tuning.counter(),
                }],
            )
            .await?;
        }
        if let Ok(frame) = WaterfallFrame::parse(&first) {
            state.ingest(&frame);
        }

        info!(
            "Waterfall up: {:.3} kHz, zoom {}, span {} kHz",
            state.tuning.center_khz(),
            state.tuning.zoom(),
            state.tuning.span_khz()
        );

        let shared = Arc::new(Mutex::new(state));
        let pending = PendingLink::new();
        let handler = WaterfallHandler {
            shared: shared.clone(),
            outbox: pending.outbox(),
        };
        let _ = pending.outbox().control(ControlMessage::Keepalive);
        let link = Link::spawn("W/F", pending, reader, writer, handler);

        Ok(Self {
            endpoint,
            timestamp,
            status,
            shared,
            link,
        })
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// Handshake timestamp, reused by audio streams of the same session.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn status(&self) -> Option<&ServerStatus> {
        self.status.as_ref()
    }

    /// Down-converter offset reported by the server.
    pub fn freq_offset_khz(&self) -> f64 {
        self.status
            .as_ref()
            .map(ServerStatus::freq_offset_khz)
            .unwrap_or(0.0)
    }

    /// Retune and/or rezoom. Returns the effective centre after clamping.
    pub fn set_freq_zoom(&self, freq_khz: f64, zoom: u32) -> Result<f64, LinkError> {
        let (center, msg) = {
            let mut state = lock(&self.shared);
            let center = state.tuning.set_freq_zoom(freq_khz, zoom);
            (
                center,
                ControlMessage::Zoom {
                    zoom: state.tuning.zoom(),
                    start: state.tuning.counter(),
                },
            )
        };
        self.link.send(msg)?;
        Ok(center)
    }

    /// Average this many frames per row; applies from the next cycle.
    pub fn set_averaging(&self, depth: usize) {
        lock(&self.shared).averager.set_depth(depth);
    }

    pub fn set_auto_scale(&self, on: bool) {
        lock(&self.shared).scale.auto_scale = on;
    }

    /// Fixed clip levels; only used while auto scaling is off.
    pub fn set_clip_levels(&self, low_db: f32, high_db: f32) {
        let mut state = lock(&self.shared);
        state.scale.low_clip_db = low_db;
        state.scale.high_clip_db = high_db;
        state.scale.dynamic_range_db = (high_db - low_db).max(1.0);
    }

    pub fn set_clip_deltas(&self, delta_low_db: f32, delta_high_db: f32) {
        let mut state = lock(&self.shared);
        state.scale.delta_low_db = delta_low_db;
        state.scale.delta_high_db = delta_high_db;
    }

    pub fn reset_clip_deltas(&self) {
        lock(&self.shared).scale.reset_deltas();
    }

    pub fn set_speed(&self, speed: u32) -> Result<(), LinkError> {
        self.link.send(ControlMessage::WfSpeed(speed))
    }

    pub fn set_db_range(&self, max_db: i32, min_db: i32) -> Result<(), LinkError> {
        self.link.send(ControlMessage::DbRange { max_db, min_db })
    }

    pub fn set_interp(&self, interp: u32) -> Result<(), LinkError> {
        self.link.send(ControlMessage::Interp(interp))
    }

    pub fn latest_row(&self) -> Option<SpectrumRow> {
        lock(&self.shared).history.latest().cloned()
    }

    /// Scroll-back rows, newest first.
    pub fn history(&self) -> Vec<SpectrumRow> {
        lock(&self.shared).history.iter_newest().cloned().collect()
    }

    pub fn rows_received(&self) -> u64 {
        lock(&self.shared).rows
    }

    pub fn tuning(&self) -> Tuning {
        lock(&self.shared).tuning.clone()
    }

    pub fn limits(&self) -> ServerLimits {
        *lock(&self.shared).tuning.limits()
    }

    pub fn scale(&self) -> ScaleState {
        lock(&self.shared).scale
    }

    pub fn divisions(&self) -> Divisions {
        lock(&self.shared).tuning.divisions(DEFAULT_MIN_BIN_SPACING)
    }

    pub fn is_terminal(&self) -> bool {
        self.link.is_terminal()
    }

    pub async fn shutdown(&mut self) {
        self.link.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_sdr::{waterfall_frame, FakeSdr};
    use tokio::time::{self, Instant};

    fn opts(zoom: u32, center: f64) -> WaterfallOptions {
        WaterfallOptions {
            zoom,
            center_khz: Some(center),
            ..WaterfallOptions::default()
        }
    }

    async fn wait_until(mut f: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !f() {
            assert!(Instant::now() < deadline, "condition not met in time");
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_closed_outbox_still_decodes_rows() {
        let pending = PendingLink::new();
        let handler_outbox = pending.outbox();
        drop(pending);
        let shared = Arc::new(Mutex::new(WaterfallState::new(
            ServerLimits::default(),
            14_200.0,
            &opts(8, 14_200.0),
        )));
        let mut handler = WaterfallHandler {
            shared: shared.clone(),
            outbox: handler_outbox,
        };
        handler.on_payload(&waterfall_frame(1, &[200u8; 1024]));
        handler.on_payload(&waterfall_frame(2, &[200u8; 1024]));
        assert_eq!(lock(&shared).rows, 2);
        assert!(!handler.send(ControlMessage::Keepalive));
    }

    #[tokio::test]
    async fn test_connect_sends_opening_and_decodes_rows() {
        let sdr = FakeSdr::start().await;
        let endpoint = ServerEndpoint::new("127.0.0.1", sdr.port()).with_password("pw");
        let server = tokio::spawn(async move {
            let mut conn = sdr.accept().await;
            let mut lines = Vec::new();
            for _ in 0..6 {
                lines.push(conn.next_text().await.unwrap());
            }
            conn.send_binary(&waterfall_frame(1, &[200u8; 1024])).await;
            conn.send_binary(&waterfall_frame(2, &[210u8; 1024])).await;
            let keepalive = conn.wait_for("SET keepalive").await;
            let zoom = conn.wait_for("SET zoom=").await;
            (conn.path.clone(), lines, keepalive, zoom)
        });

        let clock = SessionClock::new();
        let wf = WaterfallStream::connect(endpoint, &clock, opts(8, 14_200.0))
            .await
            .unwrap();
        assert_eq!(clock.current(), Some(wf.timestamp()));
        let tuning = wf.tuning();
        assert_eq!(tuning.span_khz(), 117.1875);
        assert!((tuning.start_khz() - 14_141.40625).abs() < 1e-9);
        assert!((tuning.end_khz() - 14_258.59375).abs() < 1e-9);
        assert_eq!(wf.freq_offset_khz(), 0.0);

        wait_until(|| wf.rows_received() >= 2).await;
        let row = wf.latest_row().unwrap();
        assert_eq!(row.len(), 1024);
        assert_eq!(wf.history().len(), 2);

        let center = wf.set_freq_zoom(29_990.0, 8).unwrap();
        assert_eq!(center, 30_000.0 - 117.1875 / 2.0);

        let (path, lines, keepalive, zoom) = server.await.unwrap();
        assert!(path.ends_with("/W/F"));
        assert_eq!(lines[0], "SET auth t=kiwi p=pw ipl=pw");
        assert!(lines[1].starts_with("SET zoom=8 start="));
        assert_eq!(lines[2], "SET maxdb=-10 mindb=-110");
        assert_eq!(lines[3], "SET wf_speed=4");
        assert_eq!(lines[4], "SET wf_comp=0");
        assert_eq!(lines[5], "SET interp=13");
        assert!(keepalive.is_some());
        let zoom = zoom.unwrap();
        let expected = wf.tuning().counter();
        assert_eq!(zoom, format!("SET zoom=8 start={expected}"));
    }

    #[tokio::test]
    async fn test_server_limits_override_defaults() {
        let sdr = FakeSdr::start().await;
        let endpoint = ServerEndpoint::new("127.0.0.1", sdr.port());
        let server = tokio::spawn(async move {
            let mut conn = sdr.accept().await;
            conn.send_binary(b"MSG bandwidth=32000000 zoom_max=12 wf_fft_size=2048")
                .await;
            conn.send_binary(&waterfall_frame(1, &[100u8; 2048])).await;
            // Counter moved with the new limits, so zoom is re-sent.
            let mut zoom_lines = Vec::new();
            while zoom_lines.len() < 2 {
                match conn.next_text().await {
                    Some(l) if l.starts_with("SET zoom=") => zoom_lines.push(l),
                    Some(_) => {}
                    None => break,
                }
            }
            zoom_lines
        });

        let clock = SessionClock::new();
        let wf = WaterfallStream::connect(endpoint, &clock, opts(14, 16_000.0))
            .await
            .unwrap();
        let limits = wf.limits();
        assert_eq!(limits.max_freq_khz, 32_000.0);
        assert_eq!(limits.max_zoom, 12);
        assert_eq!(limits.bins, 2048);
        assert_eq!(wf.tuning().zoom(), 12);
        assert_eq!(wf.tuning().span_khz(), 32_000.0 / 4096.0);

        let zoom_lines = server.await.unwrap();
        assert_eq!(zoom_lines.len(), 2);
        assert!(zoom_lines[0].starts_with("SET zoom=14 "));
        assert!(zoom_lines[1].starts_with("SET zoom=12 "));
    }

    #[tokio::test]
    async fn test_full_server_refused_before_connect() {
        let sdr = FakeSdr::with_status("status=active\noffline=no\nusers=4\nusers_max=4\n").await;
        let endpoint = ServerEndpoint::new("127.0.0.1", sdr.port());
        tokio::spawn(async move {
            let _ = sdr.accept().await;
        });
        let err = WaterfallStream::connect(endpoint, &SessionClock::new(), opts(0, 0.0))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::TooManyUsers { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_is_terminal_and_setters_fail() {
        let sdr = FakeSdr::with_status(
            "status=active\noffline=no\nusers=0\nusers_max=4\nfreq_offset=100000000\n",
        )
        .await;
        let endpoint = ServerEndpoint::new("127.0.0.1", sdr.port());
        tokio::spawn(async move {
            let mut conn = sdr.accept().await;
            conn.send_binary(&waterfall_frame(1, &[0u8; 1024])).await;
            time::sleep(Duration::from_millis(100)).await;
        });
        let wf = WaterfallStream::connect(endpoint, &SessionClock::new(), opts(0, 0.0))
            .await
            .unwrap();
        assert_eq!(wf.freq_offset_khz(), 100_000.0);
        wait_until(|| wf.is_terminal()).await;
        assert!(matches!(wf.set_speed(2), Err(LinkError::Closed)));
    }

    #[tokio::test]
    async fn test_averaging_and_scale_setters() {
        let sdr = FakeSdr::start().await;
        let endpoint = ServerEndpoint::new("127.0.0.1", sdr.port());
        let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let mut conn = sdr.accept().await;
            conn.send_binary(&waterfall_frame(1, &[0u8; 64])).await;
            let _ = go_rx.await;
            for seq in 2..6 {
                conn.send_binary(&waterfall_frame(seq, &[0u8; 64])).await;
            }
            time::sleep(Duration::from_secs(2)).await;
        });
        let mut wf = WaterfallStream::connect(endpoint, &SessionClock::new(), opts(0, 0.0))
            .await
            .unwrap();
        assert_eq!(wf.rows_received(), 1);

        wf.set_averaging(2);
        wf.set_auto_scale(false);
        wf.set_clip_levels(-150.0, -50.0);
        wf.set_clip_deltas(5.0, -5.0);
        let _ = go_tx.send(());
        wait_until(|| wf.rows_received() >= 3).await;
        let scale = wf.scale();
        assert!(!scale.auto_scale);
        assert_eq!(scale.low_clip_db, -150.0);
        assert_eq!(scale.delta_low_db, 5.0);
        wf.reset_clip_deltas();
        assert_eq!(wf.scale().delta_low_db, 0.0);
        assert!(!wf.divisions().major.is_empty());

        wf.shutdown().await;
        assert!(wf.is_terminal());
    }
}
