//! Error types shared by both protocol endpoints.
//!
//! Every error here is terminal for its session: the frame loop closes the
//! connection when one surfaces. Stream failures are folded into
//! [`ProtocolError::ConnectionClosed`] because the protocol does not care
//! *how* the stream died, only that no further frame can be read.

use std::io;

use thiserror::Error;

/// Errors raised while encoding, decoding, or driving a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The stream ended mid-frame, hit EOF, or was reset by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer broke a protocol rule: unknown opcode, ext-entry past the
    /// announced count, or a repeated hello.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer's hello carried a version other than 7.
    #[error("unsupported protocol version {0}")]
    VersionMismatch(u8),

    /// An outbound string does not fit the 64-byte wire field.
    #[error("string of {0} bytes exceeds the 64-byte wire field")]
    StringTooLong(usize),

    /// Text is not representable in the session's current text encoding.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Boundary conversion for the async read/write primitives. EOF, reset, and
/// every other transport failure mean the same thing at the protocol layer.
impl From<io::Error> for ProtocolError {
    fn from(_: io::Error) -> Self {
        Self::ConnectionClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings() {
        assert_eq!(ProtocolError::ConnectionClosed.to_string(), "connection closed");
        assert_eq!(
            ProtocolError::VersionMismatch(6).to_string(),
            "unsupported protocol version 6"
        );
        assert_eq!(
            ProtocolError::StringTooLong(70).to_string(),
            "string of 70 bytes exceeds the 64-byte wire field"
        );
    }

    #[test]
    fn io_errors_fold_into_connection_closed() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(ProtocolError::from(eof), ProtocolError::ConnectionClosed);

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(ProtocolError::from(reset), ProtocolError::ConnectionClosed);
    }
}
