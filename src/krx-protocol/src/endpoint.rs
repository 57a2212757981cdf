// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::str::FromStr;

use krx_core::ParseError;

pub const DEFAULT_SDR_PORT: u16 = 8073;

/// Stream tag of the spectrum endpoint.
pub const WATERFALL_STREAM: &str = "W/F";
/// Stream tag of the audio endpoint.
pub const SOUND_STREAM: &str = "SND";

/// One SDR server. Immutable for the lifetime of a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: String::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn connect_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn status_url(&self) -> String {
        format!("http://{}/status", self.connect_addr())
    }

    /// Upgrade path for a stream: `/<timestamp>/<tag>`.
    pub fn stream_path(timestamp: u64, stream: &str) -> String {
        format!("/{timestamp}/{stream}")
    }
}

impl FromStr for ServerEndpoint {
    type Err = ParseError;

    /// `host[:port[:password]]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let host = parts.next().unwrap_or_default().trim();
        if host.is_empty() {
            return Err(ParseError::field("server", "empty host"));
        }
        let port = match parts.next().map(str::trim) {
            None | Some("") => DEFAULT_SDR_PORT,
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ParseError::field("server", format!("invalid port '{p}'")))?,
        };
        let password = parts.next().unwrap_or_default().to_string();
        Ok(Self {
            host: host.to_string(),
            port,
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_only() {
        let ep: ServerEndpoint = "sdr.example.org".parse().unwrap();
        assert_eq!(ep.host, "sdr.example.org");
        assert_eq!(ep.port, DEFAULT_SDR_PORT);
        assert!(ep.password.is_empty());
    }

    #[test]
    fn test_parse_with_port_and_password() {
        let ep: ServerEndpoint = "10.0.0.5:8074:s3cr:et".parse().unwrap();
        assert_eq!(ep.port, 8074);
        assert_eq!(ep.password, "s3cr:et");
        assert_eq!(ep.status_url(), "http://10.0.0.5:8074/status");
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<ServerEndpoint>().is_err());
        assert!("host:notaport".parse::<ServerEndpoint>().is_err());
        assert!("host:0".parse::<ServerEndpoint>().is_err());
    }

    #[test]
    fn test_stream_path_and_debug_hides_password() {
        assert_eq!(ServerEndpoint::stream_path(1700000000, WATERFALL_STREAM), "/1700000000/W/F");
        let ep = ServerEndpoint::new("h", 1).with_password("pw");
        assert!(!format!("{ep:?}").contains("pw"));
    }
}
