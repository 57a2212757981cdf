// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Loopback SDR server used by the stream tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use krx_protocol::ws::{self, Message, WsReader};

pub const DEFAULT_STATUS: &str =
    "status=active\noffline=no\nusers=0\nusers_max=4\nname=Fake\nfreq_offset=0\n";

pub struct FakeSdr {
    listener: TcpListener,
    status: String,
}

pub struct FakeConn {
    pub path: String,
    reader: WsReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakeSdr {
    pub async fn start() -> Self {
        Self::with_status(DEFAULT_STATUS).await
    }

    pub async fn with_status(status: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self {
            listener,
            status: status.to_string(),
        }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// Accept one websocket client and complete the upgrade. `/status`
    /// requests arriving first are answered along the way.
    pub async fn accept(&self) -> FakeConn {
        loop {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") {
                if stream.read_exact(&mut byte).await.is_err() {
                    break;
                }
                request.push(byte[0]);
            }
            let request = String::from_utf8_lossy(&request).into_owned();
            let path = request
                .lines()
                .next()
                .and_then(|l| l.split_whitespace().nth(1))
                .unwrap_or_default()
                .to_string();
            if path == "/status" {
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    self.status.len(),
                    self.status
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
                continue;
            }
            let key = ws::header_value(&request, "Sec-WebSocket-Key")
                .unwrap_or_default()
                .to_string();
            return Self::upgrade(stream, path, &key).await;
        }
    }

    async fn upgrade(mut stream: tokio::net::TcpStream, path: String, key: &str) -> FakeConn {
        let reply = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            ws::accept_key(key)
        );
        stream.write_all(reply.as_bytes()).await.unwrap();
        let (reader, writer) = stream.into_split();
        FakeConn {
            path,
            reader: WsReader::new(reader),
            writer,
        }
    }
}

fn server_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0x80 | opcode];
    match payload.len() {
        n if n < 126 => out.push(n as u8),
        n if n <= u16::MAX as usize => {
            out.push(126);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            out.push(127);
            out.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
    out.extend_from_slice(payload);
    out
}

impl FakeConn {
    async fn send(&mut self, opcode: u8, payload: &[u8]) {
        // Errors are ignored: the client may already be gone.
        let _ = self.writer.write_all(&server_frame(opcode, payload)).await;
    }

    pub async fn send_binary(&mut self, payload: &[u8]) {
        self.send(0x2, payload).await;
    }

    pub async fn send_ping(&mut self, payload: &[u8]) {
        self.send(0x9, payload).await;
    }

    pub async fn next_client_message(&mut self) -> Option<Message> {
        self.reader.read_message().await.ok()
    }

    /// Next text line from the client, skipping pongs.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.next_client_message().await? {
                Message::Text(t) => return Some(t),
                Message::Close => return None,
                _ => {}
            }
        }
    }

    /// Read client lines until one starts with `prefix`.
    pub async fn wait_for(&mut self, prefix: &str) -> Option<String> {
        loop {
            let line = self.next_text().await?;
            if line.starts_with(prefix) {
                return Some(line);
            }
        }
    }
}

/// `W/F` frame: tag, pad byte, three little-endian header words, bins.
pub fn waterfall_frame(sequence: u32, bins: &[u8]) -> Vec<u8> {
    let mut out = b"W/F".to_vec();
    out.push(0);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(bins);
    out
}

/// `SND` frame with a big-endian S-meter and little-endian PCM.
pub fn sound_frame(sequence: u32, smeter: u16, samples: &[i16]) -> Vec<u8> {
    let mut out = b"SND".to_vec();
    out.push(0);
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(&smeter.to_be_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
