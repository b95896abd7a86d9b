//! Resize coordination: layout events become fit, apply, report sequences.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::channel::{SessionChannel, SubmitOutcome};
use crate::error::{EncodingError, LayoutError};
use crate::geometry::Geometry;
use crate::reporter::GeometryReporter;
use crate::surface::{lock_surface, FitCalculator, SharedSurface};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResizeError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// Serializes layout events into resize sequences.
///
/// Each [`ResizeCoordinator::on_layout_event`] runs to completion before the
/// next one starts, so the surface and the remote PTY always see geometries
/// in event order.
pub struct ResizeCoordinator {
    // Held for the whole sequence; doubles as the ordering lock.
    fit: Mutex<Box<dyn FitCalculator>>,
    surface: SharedSurface,
    reporter: GeometryReporter,
    channel: SessionChannel,
}

impl ResizeCoordinator {
    pub fn new(fit: Box<dyn FitCalculator>, surface: SharedSurface, channel: SessionChannel) -> Self {
        Self {
            fit: Mutex::new(fit),
            surface,
            reporter: GeometryReporter::new(),
            channel,
        }
    }

    /// Handle one layout change (window resize, font change, pane split).
    ///
    /// Computes the best fit, applies it to the surface, reads back what the
    /// surface actually settled on and reports that geometry to the remote
    /// side. Returns the reported geometry.
    ///
    /// A layout error aborts the sequence before anything is sent. Once the
    /// session has closed the report is silently dropped by the channel.
    pub fn on_layout_event(&self) -> Result<Geometry, ResizeError> {
        let fit = self.fit.lock().unwrap_or_else(PoisonError::into_inner);

        let viewport = fit.measure()?;
        let proposed = fit.compute_fit(viewport)?;

        let actual = {
            let mut surface = lock_surface(&self.surface);
            surface.apply_geometry(proposed)?;
            surface.current_geometry()?
        };
        if actual != proposed {
            log::debug!("surface clamped {proposed} to {actual}");
        }

        let frame = self.reporter.report(actual).map_err(|err| {
            log::error!("cannot report geometry {actual}: {err}");
            err
        })?;

        match self.channel.submit(frame) {
            SubmitOutcome::Transmitted | SubmitOutcome::Buffered => {
                log::debug!("reported geometry {actual}");
            }
            SubmitOutcome::Evicted(err) => log::warn!("reported geometry {actual}; {err}"),
            SubmitOutcome::Dropped => {
                log::debug!("session {}; geometry {actual} not reported", self.channel.state());
            }
        }

        Ok(actual)
    }

    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }
}
