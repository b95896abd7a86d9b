use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// Smallest geometry a fit will ever propose.
pub const MIN_FIT_COLS: u16 = 2;
pub const MIN_FIT_ROWS: u16 = 1;

/// Terminal viewport size in character cells.
///
/// A plain value: every layout computation produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub rows: u16,
    pub cols: u16,
}

impl Geometry {
    pub const fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Both dimensions are positive.
    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Size of the area a terminal is laid out into, in the fit's units
/// (pixels for a graphical viewport, cells for a host terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

/// Size of one character cell in viewport units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMetrics {
    pub width: u32,
    pub height: u32,
}

impl CellMetrics {
    /// One viewport unit per cell, for viewports already measured in cells.
    pub const UNIT: CellMetrics = CellMetrics {
        width: 1,
        height: 1,
    };
}

/// Compute how many whole cells fit into `viewport`.
///
/// Never proposes fewer than [`MIN_FIT_COLS`] x [`MIN_FIT_ROWS`]; an empty
/// viewport is an error rather than a degenerate geometry.
pub fn fit_to_viewport(viewport: ViewportSize, cell: CellMetrics) -> Result<Geometry, LayoutError> {
    if cell.width == 0 || cell.height == 0 {
        return Err(LayoutError::Viewport(format!(
            "cell metrics {}x{} must be non-zero",
            cell.width, cell.height
        )));
    }
    if viewport.width == 0 || viewport.height == 0 {
        return Err(LayoutError::EmptyViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    let cols = clamp_cells(viewport.width / cell.width).max(MIN_FIT_COLS);
    let rows = clamp_cells(viewport.height / cell.height).max(MIN_FIT_ROWS);
    Ok(Geometry::new(rows, cols))
}

fn clamp_cells(cells: u32) -> u16 {
    u16::try_from(cells).unwrap_or(u16::MAX)
}
