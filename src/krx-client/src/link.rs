// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Socket plumbing shared by the waterfall and audio streams.
//!
//! A connected stream runs two tasks: a reader that owns the websocket read
//! half and hands every payload to a [`FrameHandler`], and a writer that
//! drains an unbounded outbox of control lines. Either task failing sets the
//! terminal flag and stops the other one. Streams never reconnect on their
//! own.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use krx_core::{ConnectError, LinkError, ProtocolError};
use krx_protocol::frames::{self, ServerMessage};
use krx_protocol::ws::{self, Message, WsReader, WsWriter};
use krx_protocol::{ControlMessage, ServerEndpoint};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upgrade plus wait for the first tagged frame.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

pub type SdrReader = WsReader<OwnedReadHalf>;
pub type SdrWriter = WsWriter<OwnedWriteHalf>;

/// Connect and upgrade to `/<timestamp>/<stream>`.
pub async fn open(
    endpoint: &ServerEndpoint,
    path: &str,
    connect_timeout: Duration,
) -> Result<(SdrReader, SdrWriter), ConnectError> {
    let addr = endpoint.connect_addr();
    info!("Connecting to {}{}", addr, path);
    let mut stream = match time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(ConnectError::Unreachable {
                addr,
                reason: e.to_string(),
            })
        }
        Err(_) => return Err(ConnectError::Timeout { addr }),
    };
    let _ = stream.set_nodelay(true);

    time::timeout(
        HANDSHAKE_TIMEOUT,
        ws::client_handshake(&mut stream, &endpoint.host, endpoint.port, path),
    )
    .await
    .map_err(|_| ConnectError::HandshakeFailed(format!("upgrade timed out after {HANDSHAKE_TIMEOUT:?}")))??;

    let (reader, writer) = stream.into_split();
    Ok((WsReader::new(reader), WsWriter::new(writer)))
}

pub async fn send_all(
    writer: &mut SdrWriter,
    messages: &[ControlMessage],
) -> Result<(), ProtocolError> {
    for msg in messages {
        debug!("-> {}", msg);
        writer.send_text(&msg.to_string()).await?;
    }
    Ok(())
}

/// Read until the first binary message carrying `tag` and return it.
///
/// Every `MSG` seen on the way is passed to `on_msg`, so server-reported
/// limits land before the stream is accepted. A `badp=1` reply means the
/// password was refused.
pub async fn await_stream_tag<F>(
    reader: &mut SdrReader,
    writer: &mut SdrWriter,
    tag: &[u8; 3],
    timeout: Duration,
    mut on_msg: F,
) -> Result<Vec<u8>, ConnectError>
where
    F: FnMut(&ServerMessage),
{
    let deadline = Instant::now() + timeout;
    loop {
        let msg = time::timeout_at(deadline, reader.read_message())
            .await
            .map_err(|_| {
                ConnectError::HandshakeFailed(format!(
                    "no {} frame within {:?}",
                    String::from_utf8_lossy(tag),
                    timeout
                ))
            })??;

        let payload = match msg {
            Message::Binary(payload) => payload,
            Message::Text(text) => text.into_bytes(),
            Message::Ping(data) => {
                writer.send_pong(&data).await?;
                continue;
            }
            Message::Pong(_) => continue,
            Message::Close => {
                return Err(ConnectError::HandshakeFailed(
                    "server closed the stream during setup".into(),
                ))
            }
        };

        if frames::tag(&payload) == Some(tag.as_slice()) {
            return Ok(payload);
        }
        if let Some(msg) = ServerMessage::parse(&payload) {
            if msg.get("badp") == Some("1") {
                return Err(ConnectError::HandshakeFailed("password rejected".into()));
            }
            on_msg(&msg);
        }
    }
}

/// Receives every payload read after the handshake.
pub trait FrameHandler: Send + 'static {
    fn on_payload(&mut self, payload: &[u8]);
}

#[derive(Debug)]
enum Outbound {
    Control(ControlMessage),
    Pong(Vec<u8>),
}

/// Sending side of a link's writer task.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    pub fn control(&self, msg: ControlMessage) -> Result<(), LinkError> {
        self.tx
            .send(Outbound::Control(msg))
            .map_err(|_| LinkError::Closed)
    }

    fn pong(&self, data: Vec<u8>) {
        let _ = self.tx.send(Outbound::Pong(data));
    }
}

#[derive(Clone)]
struct LinkState {
    name: &'static str,
    terminal: Arc<AtomicBool>,
    stop: Arc<watch::Sender<bool>>,
}

impl LinkState {
    fn fail(&self, reason: impl fmt::Display) {
        if !self.terminal.swap(true, Ordering::SeqCst) {
            warn!("{} stream terminated: {}", self.name, reason);
        }
        self.stop.send_replace(true);
    }

    fn stopped(rx: &watch::Receiver<bool>) -> bool {
        *rx.borrow()
    }
}

/// Outbox created ahead of [`Link::spawn`] so handlers can hold a sender.
pub struct PendingLink {
    outbox: Outbox,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl PendingLink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            outbox: Outbox { tx },
            rx,
        }
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }
}

impl Default for PendingLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Running stream tasks plus their terminal flag.
pub struct Link {
    outbox: Outbox,
    state: LinkState,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    pub fn spawn<H: FrameHandler>(
        name: &'static str,
        pending: PendingLink,
        reader: SdrReader,
        writer: SdrWriter,
        handler: H,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let state = LinkState {
            name,
            terminal: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(stop_tx),
        };
        let PendingLink { outbox, rx } = pending;

        let read_task = tokio::spawn(read_loop(
            reader,
            handler,
            outbox.clone(),
            state.clone(),
            state.stop.subscribe(),
        ));
        let write_task = tokio::spawn(write_loop(
            writer,
            rx,
            state.clone(),
            state.stop.subscribe(),
        ));

        Self {
            outbox,
            state,
            tasks: vec![read_task, write_task],
        }
    }

    /// Queue a control line. Fails once the link is terminal.
    pub fn send(&self, msg: ControlMessage) -> Result<(), LinkError> {
        if self.is_terminal() {
            return Err(LinkError::Closed);
        }
        self.outbox.control(msg)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.terminal.load(Ordering::SeqCst)
    }

    /// Stop both tasks and wait for them to exit.
    pub async fn shutdown(&mut self) {
        self.state.terminal.store(true, Ordering::SeqCst);
        self.state.stop.send_replace(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("{} stream shut down", self.state.name);
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.state.stop.send_replace(true);
    }
}

async fn read_loop<H: FrameHandler>(
    mut reader: SdrReader,
    mut handler: H,
    outbox: Outbox,
    state: LinkState,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if LinkState::stopped(&stop_rx) {
            return;
        }
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            msg = reader.read_message() => match msg {
                Ok(Message::Binary(payload)) => handler.on_payload(&payload),
                Ok(Message::Text(text)) => handler.on_payload(text.as_bytes()),
                Ok(Message::Ping(data)) => outbox.pong(data),
                Ok(Message::Pong(_)) => {}
                Ok(Message::Close) => {
                    state.fail("closed by server");
                    return;
                }
                // The offending frame was consumed whole; framing is intact.
                Err(e @ (ProtocolError::Utf8 | ProtocolError::UnexpectedTag(_))) => {
                    debug!("{}: discarding message: {}", state.name, e);
                }
                Err(e) => {
                    state.fail(LinkError::from(e));
                    return;
                }
            }
        }
    }
}

async fn write_loop(
    mut writer: SdrWriter,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    state: LinkState,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if LinkState::stopped(&stop_rx) {
            break;
        }
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            item = rx.recv() => {
                let res = match item {
                    Some(Outbound::Control(msg)) => {
                        debug!("-> {}", msg);
                        writer.send_text(&msg.to_string()).await
                    }
                    Some(Outbound::Pong(data)) => writer.send_pong(&data).await,
                    None => break,
                };
                if let Err(e) = res {
                    state.fail(LinkError::from(e));
                    return;
                }
            }
        }
    }
    let _ = time::timeout(CLOSE_TIMEOUT, writer.send_close()).await;
}
