// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Error taxonomy shared by every client component.
//!
//! Connection-time failures surface as [`ConnectError`] and never yield a
//! partially usable stream. Anything that goes wrong after a stream is up is
//! a [`LinkError`]. Wire-level decoding problems are [`ProtocolError`], and
//! field-level text problems are [`ParseError`], which callers recover from by
//! dropping the offending unit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot reach {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("connection to {addr} timed out")]
    Timeout { addr: String },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("server full ({current}/{max} users)")]
    TooManyUsers { current: u32, max: u32 },

    #[error("server offline or under maintenance")]
    ServerOffline,

    #[error("callsign must not be empty")]
    EmptyCallsign,

    #[error("peer sent no reply to {0}")]
    NoReply(String),
}

impl From<ProtocolError> for ConnectError {
    fn from(value: ProtocolError) -> Self {
        ConnectError::HandshakeFailed(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("unexpected tag {0:?}")]
    UnexpectedTag(String),

    #[error("bad handshake reply: {0}")]
    BadHandshake(String),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u64),

    #[error("peer closed the stream")]
    Closed,

    #[error("message is not valid UTF-8")]
    Utf8,

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure after a successful connect. Terminal for SDR streams.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("link closed by peer")]
    Closed,

    #[error("link protocol failure: {0}")]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for LinkError {
    fn from(value: ProtocolError) -> Self {
        match value {
            ProtocolError::Io(e) => LinkError::Io(e),
            ProtocolError::Closed => LinkError::Closed,
            other => LinkError::Protocol(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("field {field}: {reason}")]
    Field { field: String, reason: String },

    #[error("malformed spot line: {0}")]
    SpotLine(String),

    #[error("malformed rig reply: {0:?}")]
    RigReply(String),

    #[error("malformed status: {0}")]
    Status(String),
}

impl ParseError {
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_io_maps_to_link_io() {
        let err: LinkError =
            ProtocolError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "x")).into();
        assert!(matches!(err, LinkError::Io(_)));
        let err: LinkError = ProtocolError::Closed.into();
        assert!(matches!(err, LinkError::Closed));
        let err: LinkError = ProtocolError::Utf8.into();
        assert!(matches!(err, LinkError::Protocol(ProtocolError::Utf8)));
    }

    #[test]
    fn protocol_error_during_connect_is_handshake_failure() {
        let err: ConnectError = ProtocolError::BadHandshake("HTTP/1.1 404".into()).into();
        match err {
            ConnectError::HandshakeFailed(msg) => assert!(msg.contains("404")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
