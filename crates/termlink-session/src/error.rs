use std::fmt;
use std::io;

use thiserror::Error;

use crate::geometry::Geometry;

/// Connection-level failure. Always fatal to the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("connection reset: {0}")]
    Reset(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("transport I/O error: {0}")]
    Io(String),
    /// The transport's writer went away while the session was still open.
    #[error("transport writer is gone")]
    LinkClosed,
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportError::Reset(err.to_string()),
            _ => TransportError::Io(err.to_string()),
        }
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(err) => TransportError::from(err),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

/// What the outbound buffer had to give up to make room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evicted {
    Raw { len: usize },
    Control { geometry: Option<Geometry> },
}

impl fmt::Display for Evicted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evicted::Raw { len } => write!(f, "{len} bytes of raw input"),
            Evicted::Control {
                geometry: Some(geometry),
            } => write!(f, "resize to {geometry}"),
            Evicted::Control { geometry: None } => write!(f, "a control message"),
        }
    }
}

/// Non-fatal: the connecting buffer overflowed and an old submission was dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("outbound buffer full ({capacity} messages), evicted {evicted}")]
pub struct BackpressureError {
    pub capacity: usize,
    pub evicted: Evicted,
}

/// A geometry that can never be put on the wire.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("geometry {rows} rows x {cols} cols has a zero dimension")]
    InvalidGeometry { rows: u16, cols: u16 },
    #[error("failed to serialize control message: {0}")]
    Serialize(String),
}

/// Failure raised by a fit calculator or terminal surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("viewport unavailable: {0}")]
    Viewport(String),
    #[error("viewport {width}x{height} has no usable area")]
    EmptyViewport { width: u32, height: u32 },
    #[error("terminal surface rejected geometry: {0}")]
    Surface(String),
}

/// Errors decoding what a peer put on the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed control message: {0}")]
    Malformed(String),
    #[error("control message carries invalid geometry {rows} rows x {cols} cols")]
    InvalidGeometry { rows: u16, cols: u16 },
    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_reset_maps_to_reset() {
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "peer went away");
        assert!(matches!(TransportError::from(err), TransportError::Reset(_)));

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(TransportError::from(err), TransportError::Io(_)));
    }

    #[test]
    fn test_protocol_error_maps_to_protocol_violation() {
        let err = TransportError::from(ProtocolError::UnknownTag(0x7f));
        assert_eq!(err, TransportError::Protocol("unknown frame tag 0x7f".to_string()));
    }

    #[test]
    fn test_backpressure_message() {
        let err = BackpressureError {
            capacity: 4,
            evicted: Evicted::Raw { len: 3 },
        };
        assert_eq!(
            err.to_string(),
            "outbound buffer full (4 messages), evicted 3 bytes of raw input"
        );
    }
}
