// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Minimal RFC 6455 client: upgrade handshake plus framing.
//!
//! Only what the SDR server needs: masked client frames, unmasked server
//! frames, text/binary messages with continuation, ping/pong and close.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use krx_core::ProtocolError;

/// Upper bound for a single reassembled message.
pub const MAX_MESSAGE_BYTES: u64 = 1024 * 1024;
const MAX_HANDSHAKE_BYTES: usize = 8 * 1024;
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const OP_CONTINUATION: u8 = 0x0;
const OP_TEXT: u8 = 0x1;
const OP_BINARY: u8 = 0x2;
const OP_CLOSE: u8 = 0x8;
const OP_PING: u8 = 0x9;
const OP_PONG: u8 = 0xA;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Message {
    /// Raw payload regardless of frame type.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b,
            Message::Close => &[],
        }
    }
}

/// `Sec-WebSocket-Accept` value a server must return for `key`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// First value of an HTTP header, matched case-insensitively.
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
    })
}

fn handshake_request(host: &str, port: u16, path: &str, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

/// Perform the HTTP upgrade on an already connected stream.
///
/// The reply is read byte-wise up to the blank line so no frame bytes the
/// server sends right after the upgrade are consumed.
pub async fn client_handshake<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    path: &str,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = BASE64.encode(rand::random::<[u8; 16]>());
    stream
        .write_all(handshake_request(host, port, path, &key).as_bytes())
        .await?;
    stream.flush().await?;

    let mut reply = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !reply.ends_with(b"\r\n\r\n") {
        if reply.len() >= MAX_HANDSHAKE_BYTES {
            return Err(ProtocolError::BadHandshake("reply headers too long".into()));
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(ProtocolError::Closed);
        }
        reply.push(byte[0]);
    }

    let reply = String::from_utf8_lossy(&reply);
    let status = reply.lines().next().unwrap_or_default();
    let code = status.split_whitespace().nth(1);
    if code != Some("101") {
        return Err(ProtocolError::BadHandshake(status.trim().to_string()));
    }
    match header_value(&reply, "Sec-WebSocket-Accept") {
        Some(accept) if accept == accept_key(&key) => Ok(()),
        Some(accept) => Err(ProtocolError::BadHandshake(format!(
            "Sec-WebSocket-Accept mismatch: {accept}"
        ))),
        None => Err(ProtocolError::BadHandshake(
            "missing Sec-WebSocket-Accept".into(),
        )),
    }
}

/// Encode one final frame. Client frames are always masked.
pub fn encode_frame(opcode: u8, payload: &[u8], mask: [u8; 4]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 14);
    buf.put_u8(0x80 | (opcode & 0x0f));
    match payload.len() {
        n if n < 126 => buf.put_u8(0x80 | n as u8),
        n if n <= u16::MAX as usize => {
            buf.put_u8(0x80 | 126);
            buf.put_u16(n as u16);
        }
        n => {
            buf.put_u8(0x80 | 127);
            buf.put_u64(n as u64);
        }
    }
    buf.put_slice(&mask);
    buf.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    buf.freeze()
}

#[derive(Debug)]
pub struct WsReader<R> {
    inner: R,
    max_message: u64,
    partial: Option<(u8, Vec<u8>)>,
}

impl<R: AsyncRead + Unpin> WsReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_message: MAX_MESSAGE_BYTES,
            partial: None,
        }
    }

    pub fn with_max_message(mut self, max: u64) -> Self {
        self.max_message = max;
        self
    }

    /// Read the next complete message, reassembling fragments. Control
    /// frames interleaved with fragments are returned immediately and the
    /// partial message is kept for the next call.
    pub async fn read_message(&mut self) -> Result<Message, ProtocolError> {
        loop {
            let (fin, opcode, payload) = self.read_frame().await?;
            match opcode {
                OP_PING => return Ok(Message::Ping(payload)),
                OP_PONG => return Ok(Message::Pong(payload)),
                OP_CLOSE => return Ok(Message::Close),
                OP_TEXT | OP_BINARY => {
                    if fin {
                        return finish(opcode, payload);
                    }
                    self.partial = Some((opcode, payload));
                }
                OP_CONTINUATION => {
                    let Some((first, mut buf)) = self.partial.take() else {
                        return Err(ProtocolError::UnexpectedTag(
                            "continuation without start".into(),
                        ));
                    };
                    if (buf.len() + payload.len()) as u64 > self.max_message {
                        return Err(ProtocolError::FrameTooLarge(
                            (buf.len() + payload.len()) as u64,
                        ));
                    }
                    buf.extend_from_slice(&payload);
                    if fin {
                        return finish(first, buf);
                    }
                    self.partial = Some((first, buf));
                }
                other => {
                    return Err(ProtocolError::UnexpectedTag(format!("opcode {other:#x}")));
                }
            }
        }
    }

    async fn read_frame(&mut self) -> Result<(bool, u8, Vec<u8>), ProtocolError> {
        let mut head = [0u8; 2];
        read_exact(&mut self.inner, &mut head).await?;
        let fin = head[0] & 0x80 != 0;
        let opcode = head[0] & 0x0f;
        let masked = head[1] & 0x80 != 0;
        let len = match head[1] & 0x7f {
            126 => {
                let mut ext = [0u8; 2];
                read_exact(&mut self.inner, &mut ext).await?;
                u16::from_be_bytes(ext) as u64
            }
            127 => {
                let mut ext = [0u8; 8];
                read_exact(&mut self.inner, &mut ext).await?;
                u64::from_be_bytes(ext)
            }
            n => n as u64,
        };
        if len > self.max_message {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        let mask = if masked {
            let mut key = [0u8; 4];
            read_exact(&mut self.inner, &mut key).await?;
            Some(key)
        } else {
            None
        };
        let mut payload = vec![0u8; len as usize];
        read_exact(&mut self.inner, &mut payload).await?;
        if let Some(key) = mask {
            for (i, b) in payload.iter_mut().enumerate() {
                *b ^= key[i % 4];
            }
        }
        Ok((fin, opcode, payload))
    }
}

fn finish(opcode: u8, payload: Vec<u8>) -> Result<Message, ProtocolError> {
    if opcode == OP_TEXT {
        String::from_utf8(payload)
            .map(Message::Text)
            .map_err(|_| ProtocolError::Utf8)
    } else {
        Ok(Message::Binary(payload))
    }
}

async fn read_exact<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> Result<(), ProtocolError> {
    match r.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ProtocolError::Closed),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

#[derive(Debug)]
pub struct WsWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> WsWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    async fn send(&mut self, opcode: u8, payload: &[u8]) -> Result<(), ProtocolError> {
        let frame = encode_frame(opcode, payload, rand::random());
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        self.send(OP_TEXT, text.as_bytes()).await
    }

    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.send(OP_BINARY, data).await
    }

    pub async fn send_pong(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.send(OP_PONG, data).await
    }

    pub async fn send_close(&mut self) -> Result<(), ProtocolError> {
        self.send(OP_CLOSE, &[]).await
    }
}
