// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! One-shot fetch of the SDR server's `/status` page.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use krx_core::{ConnectError, ParseError};
use krx_protocol::{ServerEndpoint, ServerStatus};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("status page returned HTTP {0}")]
    Status(u16),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub async fn fetch_status(endpoint: &ServerEndpoint) -> Result<ServerStatus, ProbeError> {
    fetch_status_url(&endpoint.status_url(), PROBE_TIMEOUT).await
}

pub async fn fetch_status_url(url: &str, timeout: Duration) -> Result<ServerStatus, ProbeError> {
    // The streams connect directly, so does the probe.
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()?;
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(ProbeError::Status(resp.status().as_u16()));
    }
    let body = resp.text().await?;
    Ok(ServerStatus::parse(&body)?)
}

/// Gate a stream connect on the server's reported capacity.
///
/// A probe that cannot reach the server or parse its reply is logged and
/// treated as unknown; only an explicit full or offline report refuses.
pub async fn preflight(endpoint: &ServerEndpoint) -> Result<Option<ServerStatus>, ConnectError> {
    match fetch_status(endpoint).await {
        Ok(status) => check(status).map(Some),
        Err(e) => {
            warn!(
                "Status probe of {} failed, connecting anyway: {}",
                endpoint.connect_addr(),
                e
            );
            Ok(None)
        }
    }
}

fn check(status: ServerStatus) -> Result<ServerStatus, ConnectError> {
    if status.is_full() {
        return Err(ConnectError::TooManyUsers {
            current: status.users,
            max: status.users_max,
        });
    }
    if !status.is_available() {
        return Err(ConnectError::ServerOffline);
    }
    info!(
        "Server '{}' ({}): {}/{} users, antenna '{}'",
        status.name, status.location, status.users, status.users_max, status.antenna
    );
    Ok(status)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `body` on every request until the test ends.
    pub(crate) async fn serve_status(listener: TcpListener, code: &'static str, body: &'static str) {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut req = Vec::new();
                let mut buf = [0u8; 512];
                while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => req.extend_from_slice(&buf[..n]),
                    }
                }
                let reply = format!(
                    "HTTP/1.1 {code}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    }

    async fn endpoint_serving(code: &'static str, body: &'static str) -> ServerEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_status(listener, code, body));
        ServerEndpoint::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_fetch_status_parses_body() {
        let ep = endpoint_serving(
            "200 OK",
            "status=active\noffline=no\nusers=1\nusers_max=4\nname=Loop\nfreq_offset=125000000\n",
        )
        .await;
        let status = fetch_status(&ep).await.unwrap();
        assert_eq!(status.users, 1);
        assert_eq!(status.name, "Loop");
        assert_eq!(status.freq_offset_khz(), 125_000.0);
    }

    #[tokio::test]
    async fn test_preflight_refuses_full_server() {
        let ep = endpoint_serving("200 OK", "status=active\noffline=no\nusers=4\nusers_max=4\n").await;
        assert!(matches!(
            preflight(&ep).await,
            Err(ConnectError::TooManyUsers { current: 4, max: 4 })
        ));
    }

    #[tokio::test]
    async fn test_preflight_refuses_offline_server() {
        let ep = endpoint_serving("200 OK", "status=offline\noffline=yes\nusers=0\n").await;
        assert!(matches!(preflight(&ep).await, Err(ConnectError::ServerOffline)));
    }

    #[tokio::test]
    async fn test_preflight_tolerates_probe_failure() {
        let ep = endpoint_serving("404 Not Found", "nope").await;
        assert!(matches!(
            fetch_status(&ep).await,
            Err(ProbeError::Status(404))
        ));
        assert!(preflight(&ep).await.unwrap().is_none());
    }
}
