//! [`TerminalSurface`] backed by a headless [`VtTerminal`].

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, Sender};

use termlink_session::{Geometry, LayoutError, TerminalSurface};

use crate::terminal::VtTerminal;

/// Largest grid the surface will allocate; bigger requests are clamped.
pub const MAX_ROWS: u16 = 500;
pub const MAX_COLS: u16 = 1000;

/// A surface that parses remote output into screen state.
///
/// User input is whatever is pushed through an [`InputSender`], plus the
/// terminal's own replies to queries such as cursor position reports.
pub struct VtSurface {
    terminal: VtTerminal,
    max: Geometry,
    input_tx: Sender<Vec<u8>>,
    input_rx: Option<Receiver<Vec<u8>>>,
}

impl VtSurface {
    pub fn new(geometry: Geometry) -> Self {
        Self::with_max(geometry, Geometry::new(MAX_ROWS, MAX_COLS))
    }

    pub fn with_max(geometry: Geometry, max: Geometry) -> Self {
        let (input_tx, input_rx) = mpsc::channel();
        Self {
            terminal: VtTerminal::new(clamp(geometry, max)),
            max,
            input_tx,
            input_rx: Some(input_rx),
        }
    }

    pub fn terminal(&self) -> &VtTerminal {
        &self.terminal
    }

    /// A handle for typing into the session.
    pub fn input(&self) -> InputSender {
        InputSender {
            tx: self.input_tx.clone(),
        }
    }
}

fn clamp(geometry: Geometry, max: Geometry) -> Geometry {
    Geometry::new(geometry.rows.min(max.rows), geometry.cols.min(max.cols))
}

impl TerminalSurface for VtSurface {
    fn current_geometry(&self) -> Result<Geometry, LayoutError> {
        Ok(self.terminal.geometry())
    }

    fn apply_geometry(&mut self, geometry: Geometry) -> Result<(), LayoutError> {
        if !geometry.is_valid() {
            return Err(LayoutError::Surface(format!("cannot size a grid to {geometry}")));
        }
        let clamped = clamp(geometry, self.max);
        if clamped != self.terminal.geometry() {
            self.terminal.resize(clamped);
        }
        Ok(())
    }

    fn take_raw_input(&mut self) -> Option<Box<dyn Read + Send>> {
        self.input_rx.take().map(|rx| {
            Box::new(ChannelReader {
                rx,
                pending: Vec::new(),
                offset: 0,
            }) as Box<dyn Read + Send>
        })
    }

    fn sink_inbound_bytes(&mut self, bytes: &[u8]) {
        self.terminal.write(bytes);
        for reply in self.terminal.take_pty_writes() {
            if self.input_tx.send(reply.into_bytes()).is_err() {
                log::debug!("input stream closed; dropping terminal reply");
            }
        }
    }
}

/// Sends keystrokes into a [`VtSurface`]'s input stream.
#[derive(Clone)]
pub struct InputSender {
    tx: Sender<Vec<u8>>,
}

impl InputSender {
    /// Returns `false` once the input stream has been dropped.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.send(bytes.into()).is_ok()
    }
}

/// Blocking reader over the surface's input queue. Ends when every sender
/// (including the surface itself) is gone.
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}
