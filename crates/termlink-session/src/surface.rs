//! Interfaces to the collaborators a session drives but does not implement.

use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::LayoutError;
use crate::geometry::{fit_to_viewport, CellMetrics, Geometry, ViewportSize};

/// Something that renders terminal bytes and produces user input.
pub trait TerminalSurface: Send {
    /// The geometry the surface is actually using right now.
    fn current_geometry(&self) -> Result<Geometry, LayoutError>;

    /// Resize the surface. The surface may clamp; read back with
    /// [`TerminalSurface::current_geometry`].
    fn apply_geometry(&mut self, geometry: Geometry) -> Result<(), LayoutError>;

    /// Hand out the raw user-input stream. Yields `Some` at most once.
    fn take_raw_input(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Render bytes received from the remote PTY.
    fn sink_inbound_bytes(&mut self, bytes: &[u8]);
}

/// A surface shared between the session channel and the resize coordinator.
pub type SharedSurface = Arc<Mutex<dyn TerminalSurface>>;

/// Wrap a surface for sharing.
pub fn shared<S: TerminalSurface + 'static>(surface: S) -> SharedSurface {
    Arc::new(Mutex::new(surface))
}

pub(crate) fn lock_surface(surface: &SharedSurface) -> MutexGuard<'_, dyn TerminalSurface + 'static> {
    surface.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Computes the best-fit geometry for the current viewport.
pub trait FitCalculator: Send {
    /// Measure the viewport the terminal is laid out into.
    fn measure(&self) -> Result<ViewportSize, LayoutError>;

    /// Best-fit geometry for `viewport`.
    fn compute_fit(&self, viewport: ViewportSize) -> Result<Geometry, LayoutError>;
}

/// A fit that always proposes the same geometry.
#[derive(Debug, Clone, Copy)]
pub struct FixedFit(pub Geometry);

impl FitCalculator for FixedFit {
    fn measure(&self) -> Result<ViewportSize, LayoutError> {
        Ok(ViewportSize {
            width: u32::from(self.0.cols),
            height: u32::from(self.0.rows),
        })
    }

    fn compute_fit(&self, viewport: ViewportSize) -> Result<Geometry, LayoutError> {
        fit_to_viewport(viewport, CellMetrics::UNIT)
    }
}
