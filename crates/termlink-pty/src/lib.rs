//! termlink-pty: the remote end of a termlink session.
//!
//! # Architecture
//!
//! - [`PtyHandle`] — Low-level PTY process management (spawn, read, write, resize).
//! - [`bridge`] — Relays one websocket connection to one freshly spawned PTY,
//!   sizing it from the client's initial resize message.

pub mod bridge;
pub mod pty;

pub use bridge::{accept, serve_connection, BridgeConfig, BridgeError};
pub use pty::{PtyError, PtyHandle};
