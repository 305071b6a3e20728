//! Pixel and cell geometry.
//!
//! Pixel values are `f64` so aspect-preserving sizes and fractional cell
//! sizes survive until the final conversion back to cells.

use serde::{Deserialize, Serialize};

/// Absolute grid coordinate. Rows count from the top of scrollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i64,
}

impl GridCoord {
    pub fn new(x: i32, y: i64) -> Self {
        Self { x, y }
    }
}

/// Rectangle of cells: origin plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GridRect {
    pub origin: GridCoord,
    pub columns: i32,
    pub rows: i64,
}

/// Size of one cell in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CellSize {
    pub width: f64,
    pub height: f64,
}

impl CellSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned rectangle in pixels, y growing downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_origin_size(origin: PixelPoint, size: PixelSize) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn size(&self) -> PixelSize {
        PixelSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Mirror vertically inside a container `container_height` tall.
    pub fn flipped(&self, container_height: f64) -> Self {
        Self::new(self.x, container_height - self.y - self.height, self.width, self.height)
    }

    /// Half-open overlap of `[x, max_x)` with `[start, end)`.
    pub fn overlaps_columns(&self, start: f64, end: f64) -> bool {
        overlaps(self.x, self.max_x(), start, end)
    }

    /// Half-open overlap of `[y, max_y)` with `[start, end)`.
    pub fn overlaps_rows(&self, start: f64, end: f64) -> bool {
        overlaps(self.y, self.max_y(), start, end)
    }

    /// Cells touched by this rectangle: the first row and column are floored,
    /// the far edges ceiled.
    pub fn covered_cells(&self, cell: CellSize) -> GridRect {
        let first_column = (self.x / cell.width).floor();
        let first_row = (self.y / cell.height).floor();
        let end_column = (self.max_x() / cell.width).ceil();
        let last_row = (self.max_y() / cell.height).ceil() - 1.0;
        GridRect {
            origin: GridCoord::new(first_column as i32, first_row as i64),
            columns: (end_column - first_column) as i32,
            rows: ((last_row - first_row) as i64).saturating_add(1),
        }
    }
}

fn overlaps(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> bool {
    a_start < a_end && b_start < b_end && a_start < b_end && b_start < a_end
}
