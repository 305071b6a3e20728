//! Draw instructions handed to the renderer.
//!
//! Virtual placements produce instructions too; for them only the image
//! linkage matters, since Unicode placeholders decide where cells go.

use std::sync::Arc;

use uuid::Uuid;

use crate::geometry::{CellSize, GridCoord, GridRect, PixelRect};
use crate::placement::Placement;
use crate::types::Bitmap;

/// Requested span of a placement in cells; zero where not given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlacementSize {
    pub columns: u32,
    pub rows: u32,
}

/// One image to paint this frame.
#[derive(Debug, Clone)]
pub struct DrawInstruction {
    /// Where to draw, in screen pixels from the top of scrollback.
    pub destination: PixelRect,
    /// Region of the bitmap to sample, bottom-left origin.
    pub source: PixelRect,
    pub bitmap: Arc<Bitmap>,
    /// Stable identity for renderer-side texture caches.
    pub image_uuid: Uuid,
    pub z_index: i32,
    pub is_virtual: bool,
    pub placement_id: u32,
    pub image_id: u32,
    pub placement_size: PlacementSize,
}

impl DrawInstruction {
    pub(crate) fn new(placement: &Placement, destination: PixelRect, bitmap: Arc<Bitmap>) -> Self {
        let full = bitmap.size();
        let source = match placement.source_rect {
            Some(rect) => rect.flipped(full.height),
            None => PixelRect::new(0.0, 0.0, full.width, full.height),
        };
        Self {
            destination,
            source,
            bitmap,
            image_uuid: placement.image.uuid,
            z_index: placement.z_index,
            is_virtual: placement.is_virtual,
            placement_id: placement.placement_id,
            image_id: placement.image_id(),
            placement_size: PlacementSize {
                columns: placement.columns.unwrap_or(0),
                rows: placement.rows.unwrap_or(0),
            },
        }
    }

    /// Cells touched by the destination rectangle.
    pub fn grid_rect(&self, cell: CellSize) -> GridRect {
        self.destination.covered_cells(cell)
    }

    /// First cell of the destination rectangle.
    pub fn grid_origin(&self, cell: CellSize) -> GridCoord {
        self.grid_rect(cell).origin
    }
}
