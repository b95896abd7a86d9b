//! termlink-session: terminal session transport and resize synchronization.
//!
//! This crate sits between a local terminal surface (something that renders
//! bytes and produces keystrokes) and a remote PTY reachable over a single
//! duplex connection. It relays raw bytes both ways and keeps the remote PTY's
//! geometry in sync with the local viewport.
//!
//! # Architecture
//!
//! - [`GeometryReporter`] — Encodes a [`Geometry`] into a wire control message.
//! - [`SessionChannel`] — Owns the connection handle and the session state
//!   machine; buffers while connecting and multiplexes raw data with control
//!   messages.
//! - [`ResizeCoordinator`] — Turns layout events into fit → apply → report
//!   sequences, in event order.
//! - [`Session`] — Owns one channel and one coordinator and drives the
//!   transport task for a single remote session.

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod geometry;
pub mod protocol;
pub mod reporter;
pub mod session;
pub mod surface;
pub mod transport;

mod input;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{
    ChannelConfig, ChannelStats, Payload, SessionChannel, SessionState, SubmitOutcome,
};
pub use coordinator::{ResizeCoordinator, ResizeError};
pub use error::{BackpressureError, EncodingError, Evicted, LayoutError, ProtocolError, TransportError};
pub use geometry::{fit_to_viewport, CellMetrics, Geometry, ViewportSize};
pub use protocol::{decode_control, ControlFrame, ControlMessage};
pub use reporter::GeometryReporter;
pub use session::{Session, SessionError};
pub use surface::{shared, FitCalculator, FixedFit, SharedSurface, TerminalSurface};
pub use transport::{Endpoint, EndpointError, Frame, DEFAULT_SESSION_PATH};
