//! Test doubles for the surface and fit collaborators.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::LayoutError;
use crate::geometry::{fit_to_viewport, CellMetrics, Geometry, ViewportSize};
use crate::surface::{FitCalculator, TerminalSurface};

/// A surface that records everything done to it. Clones share state.
#[derive(Clone)]
pub struct RecordingSurface {
    geometry: Arc<Mutex<Geometry>>,
    max: Option<Geometry>,
    applied: Arc<Mutex<Vec<Geometry>>>,
    output: Arc<Mutex<Vec<u8>>>,
    input: Arc<Mutex<Option<Box<dyn Read + Send>>>>,
    reject: Arc<Mutex<Option<String>>>,
}

impl RecordingSurface {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry: Arc::new(Mutex::new(geometry)),
            max: None,
            applied: Arc::default(),
            output: Arc::default(),
            input: Arc::default(),
            reject: Arc::default(),
        }
    }

    /// A surface that clamps each dimension to `max`.
    pub fn with_max(geometry: Geometry, max: Geometry) -> Self {
        Self {
            max: Some(max),
            ..Self::new(geometry)
        }
    }

    pub fn with_input(self, input: impl Read + Send + 'static) -> Self {
        *self.input.lock().unwrap() = Some(Box::new(input));
        self
    }

    pub fn reject_apply(&self, reason: &str) {
        *self.reject.lock().unwrap() = Some(reason.to_string());
    }

    pub fn geometry(&self) -> Geometry {
        *self.geometry.lock().unwrap()
    }

    /// Geometries passed to `apply_geometry`, before clamping.
    pub fn applied(&self) -> Vec<Geometry> {
        self.applied.lock().unwrap().clone()
    }

    pub fn output(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.output)
    }

    pub fn received(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }
}

impl TerminalSurface for RecordingSurface {
    fn current_geometry(&self) -> Result<Geometry, LayoutError> {
        Ok(self.geometry())
    }

    fn apply_geometry(&mut self, geometry: Geometry) -> Result<(), LayoutError> {
        if let Some(reason) = self.reject.lock().unwrap().clone() {
            return Err(LayoutError::Surface(reason));
        }
        self.applied.lock().unwrap().push(geometry);
        let clamped = match self.max {
            Some(max) => Geometry::new(geometry.rows.min(max.rows), geometry.cols.min(max.cols)),
            None => geometry,
        };
        *self.geometry.lock().unwrap() = clamped;
        Ok(())
    }

    fn take_raw_input(&mut self) -> Option<Box<dyn Read + Send>> {
        self.input.lock().unwrap().take()
    }

    fn sink_inbound_bytes(&mut self, bytes: &[u8]) {
        self.output.lock().unwrap().extend_from_slice(bytes);
    }
}

/// A fit calculator whose answer the test controls. Clones share state.
#[derive(Clone)]
pub struct ScriptedFit {
    next: Arc<Mutex<Result<Geometry, LayoutError>>>,
}

impl ScriptedFit {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            next: Arc::new(Mutex::new(Ok(geometry))),
        }
    }

    pub fn set(&self, geometry: Geometry) {
        *self.next.lock().unwrap() = Ok(geometry);
    }

    pub fn fail_with(&self, err: LayoutError) {
        *self.next.lock().unwrap() = Err(err);
    }
}

impl FitCalculator for ScriptedFit {
    fn measure(&self) -> Result<ViewportSize, LayoutError> {
        let geometry = self.next.lock().unwrap().clone()?;
        Ok(ViewportSize {
            width: u32::from(geometry.cols),
            height: u32::from(geometry.rows),
        })
    }

    fn compute_fit(&self, viewport: ViewportSize) -> Result<Geometry, LayoutError> {
        fit_to_viewport(viewport, CellMetrics::UNIT)
    }
}

/// Poll `cond` until it holds, panicking after five seconds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
