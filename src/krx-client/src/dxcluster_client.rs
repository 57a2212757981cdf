// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! DX cluster telnet feed with automatic reconnect.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use krx_core::spot::{
    Spot, SpotId, SpotTable, CLEANUP_INTERVAL_SECS, SPOT_TTL_SECS, UPDATE_INTERVAL_SECS,
};
use krx_core::ConnectError;
use krx_protocol::dxcluster::{
    is_spot_line, login_line, parse_spot_line, LineBuffer, DEFAULT_DXCLUSTER_HOST,
    DEFAULT_DXCLUSTER_PORT, KEEPALIVE,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on one receive wait, so maintenance runs on a quiet feed.
const READ_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DxClusterOptions {
    pub host: String,
    pub port: u16,
    pub callsign: String,
    pub reconnect_delay: Duration,
    pub cleanup_interval: Duration,
    pub update_interval: Duration,
    /// Wait for the cluster's answer to a keepalive.
    pub keepalive_timeout: Duration,
    pub spot_ttl: chrono::Duration,
    /// Initial visibility window in kHz.
    pub window_khz: (f64, f64),
}

impl DxClusterOptions {
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_DXCLUSTER_HOST.to_string(),
            port: DEFAULT_DXCLUSTER_PORT,
            callsign: callsign.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            cleanup_interval: Duration::from_secs(CLEANUP_INTERVAL_SECS as u64),
            update_interval: Duration::from_secs(UPDATE_INTERVAL_SECS as u64),
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            spot_ttl: chrono::Duration::seconds(SPOT_TTL_SECS),
            window_khz: (0.0, 30_000.0),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct Shared {
    table: Mutex<SpotTable>,
    window: Mutex<(f64, f64)>,
    dirty: AtomicBool,
    connected: AtomicBool,
    failures: AtomicU32,
    missed_keepalives: AtomicU32,
}

impl Shared {
    fn recompute(&self) {
        let (start, end) = *lock(&self.window);
        let mut table = lock(&self.table);
        let visible = table.recompute_visible(start, end).len();
        debug!("DX cluster: {} of {} spots visible", visible, table.len());
    }

    /// Feed received bytes through the line splitter; returns whether a
    /// spot was stored.
    fn ingest(&self, lines: &mut LineBuffer, bytes: &[u8]) -> bool {
        self.missed_keepalives.store(0, Ordering::Relaxed);
        let mut stored = false;
        for line in lines.push(bytes) {
            if !is_spot_line(&line) {
                continue;
            }
            match parse_spot_line(&line) {
                Ok(spot) => {
                    lock(&self.table).insert(Spot {
                        callsign: spot.callsign,
                        spotter: spot.spotter,
                        freq_khz: spot.freq_khz,
                        timestamp: Utc::now(),
                        raw_fields: spot.fields,
                    });
                    stored = true;
                }
                Err(e) => warn!("DX cluster: {}", e),
            }
        }
        stored
    }
}

/// Background DX cluster client. Spots are kept in a shared table; the
/// caller reads the visible subset for the current window.
pub struct SpotFeedClient {
    shared: Arc<Shared>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SpotFeedClient {
    /// Start the feed task. Must be called inside a tokio runtime.
    pub fn connect(opts: DxClusterOptions) -> Result<Self, ConnectError> {
        if opts.callsign.trim().is_empty() {
            return Err(ConnectError::EmptyCallsign);
        }
        let shared = Arc::new(Shared {
            table: Mutex::new(SpotTable::new(opts.spot_ttl)),
            window: Mutex::new(opts.window_khz),
            dirty: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            missed_keepalives: AtomicU32::new(0),
        });
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_feed(opts, shared.clone(), stop_rx));
        Ok(Self {
            shared,
            stop,
            task: Some(task),
        })
    }

    /// Set the frequency window; visibility is recomputed on the next tick.
    pub fn set_window(&self, start_khz: f64, end_khz: f64) {
        *lock(&self.shared.window) = (start_khz, end_khz);
        self.shared.dirty.store(true, Ordering::Relaxed);
    }

    pub fn window(&self) -> (f64, f64) {
        *lock(&self.shared.window)
    }

    /// Visible spots ordered by frequency.
    pub fn visible_spots(&self) -> Vec<(SpotId, Spot)> {
        lock(&self.shared.table).visible_spots()
    }

    pub fn spot_count(&self) -> usize {
        lock(&self.shared.table).len()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    /// Connection attempts or sessions that failed since the last good
    /// connect.
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Keepalives in a row the cluster left unanswered; reset by any
    /// received data.
    pub fn missed_keepalives(&self) -> u32 {
        self.shared.missed_keepalives.load(Ordering::Relaxed)
    }

    pub async fn disconnect(&mut self) {
        self.stop.send_replace(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SpotFeedClient {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

async fn run_feed(opts: DxClusterOptions, shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    let addr = format!("{}:{}", opts.host, opts.port);
    loop {
        if *stop_rx.borrow() {
            break;
        }

        info!("DX cluster: connecting to {} as {}", addr, opts.callsign);
        match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                shared.failures.store(0, Ordering::Relaxed);
                shared.connected.store(true, Ordering::Relaxed);
                let result = run_session(&opts, &shared, stream, &mut stop_rx).await;
                shared.connected.store(false, Ordering::Relaxed);
                match result {
                    Ok(()) => break,
                    Err(e) => warn!("DX cluster session ended: {}", e),
                }
            }
            Ok(Err(e)) => warn!("DX cluster connect to {} failed: {}", addr, e),
            Err(_) => warn!("DX cluster connect to {} timed out", addr),
        }
        shared.failures.fetch_add(1, Ordering::Relaxed);

        tokio::select! {
            _ = time::sleep(opts.reconnect_delay) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!("DX cluster feed stopped");
}

/// One connected session. `Ok` only when asked to stop.
async fn run_session(
    opts: &DxClusterOptions,
    shared: &Shared,
    stream: TcpStream,
    stop_rx: &mut watch::Receiver<bool>,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    writer
        .write_all(login_line(&opts.callsign).as_bytes())
        .await?;

    let mut lines = LineBuffer::new();
    let mut buf = vec![0u8; 4096];
    let mut last_cleanup = Instant::now();
    let mut last_update = Instant::now();

    loop {
        let mut stored = false;
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    return Ok(());
                }
            }
            read = time::timeout(READ_TICK, reader.read(&mut buf)) => match read {
                Ok(Ok(0)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "cluster closed the connection",
                    ));
                }
                Ok(Ok(n)) => stored = shared.ingest(&mut lines, &buf[..n]),
                Ok(Err(e)) => return Err(e),
                Err(_) => {}
            }
        }

        if last_cleanup.elapsed() >= opts.cleanup_interval {
            last_cleanup = Instant::now();
            writer.write_all(KEEPALIVE.as_bytes()).await?;
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        return Ok(());
                    }
                }
                read = time::timeout(opts.keepalive_timeout, reader.read(&mut buf)) => match read {
                    Ok(Ok(0)) => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "cluster closed the connection",
                        ));
                    }
                    Ok(Ok(n)) => stored |= shared.ingest(&mut lines, &buf[..n]),
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        let missed = shared.missed_keepalives.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!("DX cluster: no reply to keepalive ({} in a row)", missed);
                    }
                }
            }
            let purged = lock(&shared.table).purge_expired(Utc::now());
            if purged > 0 {
                debug!("DX cluster: purged {} expired spots", purged);
            }
        }

        let dirty = shared.dirty.swap(false, Ordering::Relaxed);
        if stored || dirty || last_update.elapsed() >= opts.update_interval {
            last_update = Instant::now();
            shared.recompute();
        }
    }
}
