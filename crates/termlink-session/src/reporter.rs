use crate::error::EncodingError;
use crate::geometry::Geometry;
use crate::protocol::{ControlFrame, ControlMessage};

/// Converts geometry readings into wire-encoded resize control messages.
///
/// Stateless and pure: the same geometry always encodes to the same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryReporter;

impl GeometryReporter {
    pub fn new() -> Self {
        Self
    }

    /// Encode a resize message for `geometry`.
    pub fn encode(&self, geometry: Geometry) -> Result<Vec<u8>, EncodingError> {
        if !geometry.is_valid() {
            return Err(EncodingError::InvalidGeometry {
                rows: geometry.rows,
                cols: geometry.cols,
            });
        }

        serde_json::to_vec(&ControlMessage::Resize(geometry))
            .map_err(|e| EncodingError::Serialize(e.to_string()))
    }

    /// Encode `geometry` into a frame ready for submission to a session channel.
    pub fn report(&self, geometry: Geometry) -> Result<ControlFrame, EncodingError> {
        let wire = self.encode(geometry)?;
        Ok(ControlFrame::new(ControlMessage::Resize(geometry), wire))
    }
}
