// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! CAT control of a transceiver through a `rigctld` TCP daemon.
//!
//! Every command is one request line answered by a fixed number of short
//! reply lines (an `RPRT` status line ends a reply early). The first
//! unsupported, empty or malformed reply (or any I/O failure) marks the link
//! unhealthy, after which every call is a no-op until the caller reconnects.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, warn};

use krx_core::rig::{RigState, Vfo};
use krx_core::{ConnectError, ParseError, RadioMode};
use krx_protocol::rigctl::{self, RigCommand, RigReply, MAX_REPLY_BYTES};

pub const CAT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_RIGCTL_PORT: u16 = 4532;

/// How CAT failures reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatErrorPolicy {
    /// Failures become "no value" / "nothing changed"; check
    /// [`RigControlClient::is_healthy`].
    #[default]
    Silent,
    /// Failures are returned as [`CatError`].
    Surface,
}

#[derive(Debug, Error)]
pub enum CatError {
    #[error("{0} kHz is outside the rig's tuning range")]
    OutOfRange(f64),

    #[error("rig does not support {0}")]
    Unsupported(String),

    #[error("CAT link is down")]
    LinkDown,

    #[error("CAT i/o: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Malformed(#[from] ParseError),
}

pub struct RigControlClient {
    addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    policy: CatErrorPolicy,
    timeout: Duration,
    state: RigState,
}

impl RigControlClient {
    pub async fn connect(host: &str, port: u16) -> Result<Self, ConnectError> {
        Self::connect_with(host, port, CatErrorPolicy::default()).await
    }

    /// Connect and confirm the daemon answers a frequency query.
    pub async fn connect_with(
        host: &str,
        port: u16,
        policy: CatErrorPolicy,
    ) -> Result<Self, ConnectError> {
        let addr = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        info!("CAT: connecting to {}", addr);
        let stream = match time::timeout(CAT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ConnectError::Unreachable {
                    addr,
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(ConnectError::Timeout { addr }),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("CAT: set_nodelay failed: {}", e);
        }

        let (reader, writer) = stream.into_split();
        let mut client = Self {
            addr,
            reader: BufReader::new(reader),
            writer,
            policy,
            timeout: CAT_TIMEOUT,
            state: RigState {
                link_healthy: true,
                ..RigState::default()
            },
        };
        match client.fetch_freq().await {
            Ok(freq_khz) => {
                info!("CAT: {} up, rig at {:.3} kHz", client.addr, freq_khz);
                Ok(client)
            }
            Err(e) => {
                warn!("CAT: {} did not answer get_freq: {}", client.addr, e);
                Err(ConnectError::NoReply(RigCommand::GetFreq.to_string()))
            }
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn policy(&self) -> CatErrorPolicy {
        self.policy
    }

    pub fn is_healthy(&self) -> bool {
        self.state.link_healthy
    }

    /// Last-known transceiver state.
    pub fn state(&self) -> &RigState {
        &self.state
    }

    fn mark_down(&mut self, reason: &str) {
        if self.state.link_healthy {
            warn!("CAT: link to {} lost: {}", self.addr, reason);
        }
        self.state.link_healthy = false;
    }

    async fn transact(&mut self, cmd: RigCommand) -> Result<String, CatError> {
        if !self.state.link_healthy {
            return Err(CatError::LinkDown);
        }
        let line = cmd.encode();
        debug!("CAT -> {}", line.trim_end());

        let reader = &mut self.reader;
        let writer = &mut self.writer;
        let expected = cmd.reply_lines();
        let exchange = async {
            writer.write_all(line.as_bytes()).await?;
            let mut raw = Vec::new();
            for _ in 0..expected {
                let start = raw.len();
                let mut limited = (&mut *reader).take(MAX_REPLY_BYTES as u64);
                let n = limited.read_until(b'\n', &mut raw).await?;
                if n == 0 || rigctl::is_status_line(&raw[start..]) {
                    break;
                }
            }
            Ok::<_, io::Error>(raw)
        };
        let raw = match time::timeout(self.timeout, exchange).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                self.mark_down(&e.to_string());
                return Err(CatError::Io(e));
            }
            Err(_) => {
                self.mark_down("reply timed out");
                return Err(CatError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no reply to {cmd}"),
                )));
            }
        };

        match RigReply::classify(&raw) {
            RigReply::Value(reply) => {
                debug!("CAT <- {}", reply.trim_end());
                Ok(reply)
            }
            RigReply::Unsupported => {
                self.mark_down(&format!("{cmd} unsupported"));
                Err(CatError::Unsupported(cmd.to_string()))
            }
            RigReply::Empty => {
                self.mark_down("empty reply");
                Err(CatError::LinkDown)
            }
        }
    }

    fn settle<T>(&self, result: Result<T, CatError>) -> Result<Option<T>, CatError> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if self.policy == CatErrorPolicy::Silent => {
                debug!("CAT: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_vfo(&mut self) -> Result<Vfo, CatError> {
        let vfo = rigctl::parse_vfo(&self.transact(RigCommand::GetVfo).await?);
        self.state.vfo = vfo;
        Ok(vfo)
    }

    async fn fetch_freq(&mut self) -> Result<f64, CatError> {
        self.fetch_vfo().await?;
        let reply = self.transact(RigCommand::GetFreq).await?;
        match rigctl::parse_freq_khz(&reply) {
            Ok(freq_khz) => {
                self.state.freq_khz = Some(freq_khz);
                Ok(freq_khz)
            }
            Err(e) => {
                self.mark_down(&e.to_string());
                Err(e.into())
            }
        }
    }

    async fn fetch_mode(&mut self) -> Result<RadioMode, CatError> {
        let mode = rigctl::parse_mode(&self.transact(RigCommand::GetMode).await?);
        self.state.mode = mode;
        Ok(mode)
    }

    async fn fetch_ptt(&mut self) -> Result<bool, CatError> {
        let ptt = rigctl::parse_ptt(&self.transact(RigCommand::GetPtt).await?);
        self.state.ptt_active = ptt;
        Ok(ptt)
    }

    pub async fn get_vfo(&mut self) -> Result<Option<Vfo>, CatError> {
        let result = self.fetch_vfo().await;
        self.settle(result)
    }

    /// Frequency of the active VFO in kHz.
    pub async fn get_freq(&mut self) -> Result<Option<f64>, CatError> {
        let result = self.fetch_freq().await;
        self.settle(result)
    }

    pub async fn get_mode(&mut self) -> Result<Option<RadioMode>, CatError> {
        let result = self.fetch_mode().await;
        self.settle(result)
    }

    pub async fn get_ptt(&mut self) -> Result<Option<bool>, CatError> {
        let result = self.fetch_ptt().await;
        self.settle(result)
    }

    /// Tune the rig. Returns whether the frequency was sent; requests outside
    /// 100..=30000 kHz are never transmitted.
    pub async fn set_freq(&mut self, freq_khz: f64) -> Result<bool, CatError> {
        if !RigState::in_cat_range(freq_khz) {
            return match self.settle::<()>(Err(CatError::OutOfRange(freq_khz))) {
                Ok(_) => Ok(false),
                Err(e) => Err(e),
            };
        }
        let result = self
            .transact(RigCommand::set_freq_khz(freq_khz))
            .await
            .map(|_| self.state.freq_khz = Some(freq_khz));
        Ok(self.settle(result)?.is_some())
    }

    pub async fn set_mode(&mut self, mode: RadioMode) -> Result<bool, CatError> {
        let result = self
            .transact(RigCommand::SetMode(mode))
            .await
            .map(|_| self.state.mode = mode);
        Ok(self.settle(result)?.is_some())
    }

    /// Refresh frequency, mode and PTT. Failures are reflected in
    /// `link_healthy` of the returned state.
    pub async fn poll(&mut self) -> RigState {
        if let Err(e) = self.fetch_freq().await {
            debug!("CAT poll: {}", e);
        } else if let Err(e) = self.fetch_mode().await {
            debug!("CAT poll: {}", e);
        } else if let Err(e) = self.fetch_ptt().await {
            debug!("CAT poll: {}", e);
        }
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<String>>>;

    /// Minimal rigctld: answers each command line from a fixed table.
    async fn fake_rigctld(ptt_reply: &'static str) -> (u16, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log.lock().unwrap().push(line.clone());
                let reply = match line.split_whitespace().next().unwrap_or_default() {
                    "\\get_vfo" => "VFOA\n",
                    "\\get_freq" => "14074000\n",
                    "\\get_mode" => {
                        // Mode and passband in separate segments.
                        if writer.write_all(b"USB\n").await.is_err() {
                            break;
                        }
                        time::sleep(Duration::from_millis(50)).await;
                        "2400\n"
                    }
                    "\\get_ptt" => ptt_reply,
                    "\\set_freq" | "\\set_mode" => "RPRT 0\n",
                    _ => "RPRT -5\n",
                };
                if writer.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        });
        (port, seen)
    }

    #[tokio::test]
    async fn test_connect_and_poll() {
        let (port, seen) = fake_rigctld("0\n").await;
        let mut cat = RigControlClient::connect("127.0.0.1", port).await.unwrap();
        assert!(cat.is_healthy());
        assert_eq!(cat.state().freq_khz, Some(14_074.0));

        let state = cat.poll().await;
        assert!(state.link_healthy);
        assert_eq!(state.freq_khz, Some(14_074.0));
        assert_eq!(state.mode, RadioMode::USB);
        assert_eq!(state.vfo, Vfo::A);
        assert!(!state.ptt_active);
        assert_eq!(
            seen.lock().unwrap()[..2],
            ["\\get_vfo".to_string(), "\\get_freq".to_string()]
        );
    }

    #[tokio::test]
    async fn test_split_mode_reply_keeps_replies_in_step() {
        let (port, _) = fake_rigctld("1\n").await;
        let mut cat = RigControlClient::connect("127.0.0.1", port).await.unwrap();
        assert_eq!(cat.get_mode().await.unwrap(), Some(RadioMode::USB));
        assert_eq!(cat.get_ptt().await.unwrap(), Some(true));
        assert_eq!(cat.get_freq().await.unwrap(), Some(14_074.0));
        assert!(cat.is_healthy());
    }

    #[tokio::test]
    async fn test_set_freq_range_gate() {
        let (port, seen) = fake_rigctld("0\n").await;
        let mut cat = RigControlClient::connect("127.0.0.1", port).await.unwrap();
        assert!(!cat.set_freq(50.0).await.unwrap());
        assert!(!cat.set_freq(30_000.5).await.unwrap());
        assert!(cat.set_freq(7_074.0).await.unwrap());
        assert!(cat.set_mode(RadioMode::LSB).await.unwrap());
        assert_eq!(cat.state().freq_khz, Some(7_074.0));
        assert_eq!(cat.state().mode, RadioMode::LSB);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[2], "\\set_freq 7074000");
        assert_eq!(seen[3], "\\set_mode LSB 2400");
    }

    #[tokio::test]
    async fn test_out_of_range_surfaces_when_asked() {
        let (port, _) = fake_rigctld("0\n").await;
        let mut cat = RigControlClient::connect_with("127.0.0.1", port, CatErrorPolicy::Surface)
            .await
            .unwrap();
        assert!(matches!(
            cat.set_freq(99.0).await,
            Err(CatError::OutOfRange(f)) if f == 99.0
        ));
        assert!(cat.is_healthy());
    }

    #[tokio::test]
    async fn test_unsupported_reply_takes_link_down() {
        let (port, seen) = fake_rigctld("RPRT -5\n").await;
        let mut cat = RigControlClient::connect("127.0.0.1", port).await.unwrap();
        assert_eq!(cat.get_ptt().await.unwrap(), None);
        assert!(!cat.is_healthy());

        // Nothing else goes out until a reconnect.
        let sent = seen.lock().unwrap().len();
        assert_eq!(cat.get_freq().await.unwrap(), None);
        assert!(!cat.set_freq(7_000.0).await.unwrap());
        assert!(!cat.poll().await.link_healthy);
        assert_eq!(seen.lock().unwrap().len(), sent);
    }

    #[tokio::test]
    async fn test_surface_policy_reports_link_down() {
        let (port, _) = fake_rigctld("RPRT -5\n").await;
        let mut cat = RigControlClient::connect_with("127.0.0.1", port, CatErrorPolicy::Surface)
            .await
            .unwrap();
        assert!(matches!(cat.get_ptt().await, Err(CatError::Unsupported(_))));
        assert!(matches!(cat.get_mode().await, Err(CatError::LinkDown)));
    }

    #[tokio::test]
    async fn test_connect_requires_frequency_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept and hang up without answering.
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        assert!(matches!(
            RigControlClient::connect("127.0.0.1", port).await,
            Err(ConnectError::NoReply(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(matches!(
            RigControlClient::connect("127.0.0.1", port).await,
            Err(ConnectError::Unreachable { .. })
        ));
    }
}
