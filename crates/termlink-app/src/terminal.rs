//! The local terminal as a session surface.

use std::io::{self, Read, Write};

use crossterm::terminal;
use termlink_session::{
    fit_to_viewport, CellMetrics, FitCalculator, Geometry, LayoutError, TerminalSurface, ViewportSize,
};

fn local_size() -> Result<(u16, u16), LayoutError> {
    terminal::size().map_err(|e| LayoutError::Viewport(format!("cannot read terminal size: {e}")))
}

/// Stdin in, stdout out. The local emulator owns the window, so applying a
/// geometry is a no-op and reading back reports whatever the window is now.
pub struct StdioSurface {
    stdout: io::Stdout,
    stdin_taken: bool,
}

impl StdioSurface {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            stdin_taken: false,
        }
    }
}

impl Default for StdioSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSurface for StdioSurface {
    fn current_geometry(&self) -> Result<Geometry, LayoutError> {
        let (cols, rows) = local_size()?;
        Ok(Geometry::new(rows, cols))
    }

    fn apply_geometry(&mut self, _geometry: Geometry) -> Result<(), LayoutError> {
        Ok(())
    }

    fn take_raw_input(&mut self) -> Option<Box<dyn Read + Send>> {
        if std::mem::replace(&mut self.stdin_taken, true) {
            return None;
        }
        Some(Box::new(io::stdin()))
    }

    fn sink_inbound_bytes(&mut self, bytes: &[u8]) {
        let mut out = self.stdout.lock();
        if let Err(err) = out.write_all(bytes).and_then(|()| out.flush()) {
            log::debug!("stdout write failed: {err}");
        }
    }
}

/// Fits the remote PTY to the local window, one cell per column and row.
pub struct LocalTerminalFit;

impl FitCalculator for LocalTerminalFit {
    fn measure(&self) -> Result<ViewportSize, LayoutError> {
        let (cols, rows) = local_size()?;
        Ok(ViewportSize {
            width: u32::from(cols),
            height: u32::from(rows),
        })
    }

    fn compute_fit(&self, viewport: ViewportSize) -> Result<Geometry, LayoutError> {
        fit_to_viewport(viewport, CellMetrics::UNIT)
    }
}

/// Raw mode for as long as the guard lives.
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            log::warn!("failed to restore terminal mode: {err}");
        }
    }
}
