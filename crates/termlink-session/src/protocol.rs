//! Control messages exchanged alongside raw terminal bytes.
//!
//! Control messages are JSON records tagged by `type`. They always travel as
//! their own message (a websocket text frame, or a control-tagged frame on a
//! byte stream), never inline with raw PTY data.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::geometry::Geometry;

/// A control message. Serialized as tagged JSON, e.g.
/// `{"type":"resize","rows":24,"cols":80}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// The client's terminal now has this many rows and columns.
    Resize(Geometry),
}

impl ControlMessage {
    pub fn geometry(&self) -> Option<Geometry> {
        match self {
            ControlMessage::Resize(geometry) => Some(*geometry),
        }
    }
}

/// A control message together with its encoded wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    message: ControlMessage,
    wire: Vec<u8>,
}

impl ControlFrame {
    pub(crate) fn new(message: ControlMessage, wire: Vec<u8>) -> Self {
        Self { message, wire }
    }

    pub fn message(&self) -> &ControlMessage {
        &self.message
    }

    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn into_wire(self) -> Vec<u8> {
        self.wire
    }

    /// Whether this frame reports a geometry change.
    pub fn is_resize(&self) -> bool {
        matches!(self.message, ControlMessage::Resize(_))
    }
}

/// Decode a control message received from a peer.
///
/// Rejects resize messages with a zero dimension.
pub fn decode_control(bytes: &[u8]) -> Result<ControlMessage, ProtocolError> {
    let message: ControlMessage =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    match message {
        ControlMessage::Resize(geometry) if !geometry.is_valid() => {
            Err(ProtocolError::InvalidGeometry {
                rows: geometry.rows,
                cols: geometry.cols,
            })
        }
        message => Ok(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_resize() {
        let message = decode_control(br#"{"type":"resize","rows":40,"cols":120}"#).unwrap();
        assert_eq!(message, ControlMessage::Resize(Geometry::new(40, 120)));
        assert_eq!(message.geometry(), Some(Geometry::new(40, 120)));
    }

    #[test]
    fn test_decode_ignores_field_order() {
        let message = decode_control(br#"{"cols":80,"rows":24,"type":"resize"}"#).unwrap();
        assert_eq!(message, ControlMessage::Resize(Geometry::new(24, 80)));
    }

    #[test]
    fn test_decode_rejects_zero_dimensions() {
        let err = decode_control(br#"{"type":"resize","rows":0,"cols":80}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidGeometry { rows: 0, cols: 80 }
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = decode_control(br#"{"type":"ping"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_raw_terminal_bytes() {
        let err = decode_control(b"ls -la\r").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_out_of_range_dimension() {
        let err = decode_control(br#"{"type":"resize","rows":70000,"cols":80}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }
}
