//! termlink-vt: a headless terminal surface for termlink sessions.
//!
//! Wraps `alacritty_terminal` so remote PTY output can be parsed into screen
//! state without a renderer, e.g. to capture what a remote shell shows.

pub mod screen;
pub mod surface;
pub mod terminal;

pub use screen::{CursorPosition, ScreenView};
pub use surface::{InputSender, VtSurface, MAX_COLS, MAX_ROWS};
pub use terminal::VtTerminal;
