//! Placements and the parent/child graph between them.
//!
//! A placement positions one image either at an absolute grid coordinate or
//! relative to another placement. Relative placements form a forest: the
//! graph rejects any insertion that would close a loop, and removing a
//! placement removes everything positioned relative to it.
//!
//! Parents are addressed the way the protocol addresses them, by
//! `(image id, placement id)`. Children are tracked by an internal
//! [`PlacementKey`], since protocol placement ids may be zero or reused.

use std::collections::{HashSet, VecDeque};

use crate::error::GraphicsError;
use crate::geometry::{CellSize, GridCoord, GridRect, PixelPoint, PixelRect, PixelSize};
use crate::types::Image;

/// Internal identity of one inserted placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlacementKey(u64);

/// Offset from the parent's top-left cell, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Displacement {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Cursor position when the placement was created.
    Absolute(GridCoord),
    /// Positioned against another placement.
    Relative {
        parent_image: u32,
        parent_placement: u32,
        displacement: Displacement,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    key: PlacementKey,
    pub image: Image,
    pub placement_id: u32,
    pub origin: Origin,
    /// Offset inside the first cell, in pixels.
    pub pixel_offset: Option<PixelPoint>,
    /// Region of the image to show, in image pixels.
    pub source_rect: Option<PixelRect>,
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    pub z_index: i32,
    /// Driven by Unicode placeholders rather than drawn directly.
    pub is_virtual: bool,
    children: Vec<PlacementKey>,
}

impl Placement {
    pub fn new(image: Image, placement_id: u32, origin: Origin) -> Self {
        Self {
            key: PlacementKey(0),
            image,
            placement_id,
            origin,
            pixel_offset: None,
            source_rect: None,
            rows: None,
            columns: None,
            z_index: 0,
            is_virtual: false,
            children: Vec::new(),
        }
    }

    pub fn key(&self) -> PlacementKey {
        self.key
    }

    pub fn image_id(&self) -> u32 {
        self.image.identifier()
    }

    pub fn children(&self) -> &[PlacementKey] {
        &self.children
    }

    /// `(image id, placement id)` of the parent, for relative placements.
    pub fn parent_ref(&self) -> Option<(u32, u32)> {
        match self.origin {
            Origin::Absolute(_) => None,
            Origin::Relative {
                parent_image,
                parent_placement,
                ..
            } => Some((parent_image, parent_placement)),
        }
    }

    /// Displayed size in pixels.
    ///
    /// Both rows and columns stretch to fit; one of them keeps the image's
    /// aspect ratio; neither shows the source region (or whole image) at its
    /// native size.
    pub fn pixel_size(&self, cell: CellSize) -> PixelSize {
        match (self.rows, self.columns) {
            (Some(rows), Some(columns)) => PixelSize {
                width: cell.width * f64::from(columns),
                height: cell.height * f64::from(rows),
            },
            (Some(rows), None) => {
                let height = cell.height * f64::from(rows);
                let width = match self.aspect_ratio() {
                    Some(ratio) => (height * ratio).round(),
                    None => 0.0,
                };
                PixelSize { width, height }
            }
            (None, Some(columns)) => {
                let width = cell.width * f64::from(columns);
                let height = match self.aspect_ratio() {
                    Some(ratio) => (width / ratio).round(),
                    None => 0.0,
                };
                PixelSize { width, height }
            }
            (None, None) => match self.source_rect {
                Some(rect) => rect.size(),
                None => self.image.size(),
            },
        }
    }

    fn aspect_ratio(&self) -> Option<f64> {
        let size = match self.source_rect {
            Some(rect) => rect.size(),
            None => self.image.size(),
        };
        (size.width > 0.0 && size.height > 0.0).then(|| size.width / size.height)
    }
}

/// The set of live placements.
#[derive(Debug, Default)]
pub struct PlacementGraph {
    placements: Vec<Placement>,
    next_key: u64,
}

impl PlacementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Placements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Placement> {
        self.placements.iter()
    }

    pub fn get(&self, key: PlacementKey) -> Option<&Placement> {
        self.placements.iter().find(|p| p.key == key)
    }

    /// Oldest placement of `image_id` with `placement_id`.
    pub fn find(&self, image_id: u32, placement_id: u32) -> Option<&Placement> {
        self.placements
            .iter()
            .find(|p| p.image_id() == image_id && p.placement_id == placement_id)
    }

    /// Whether a placement identified by `own` with parent `parent` would
    /// sit on a loop of parent links.
    pub fn forms_cycle(&self, own: (u32, u32), parent: Option<(u32, u32)>) -> bool {
        let mut current = parent;
        // Every step visits a distinct placement unless the graph already
        // loops, so the walk is bounded by the placement count.
        for _ in 0..=self.placements.len() {
            let Some(link) = current else {
                return false;
            };
            if link == own {
                return true;
            }
            current = match self.find(link.0, link.1) {
                Some(p) => p.parent_ref(),
                None => return false,
            };
        }
        true
    }

    /// Insert `placement`, replacing any placement with the same non-zero
    /// `(image id, placement id)`.
    ///
    /// The replaced placement's children move over to the new one.
    pub fn insert(&mut self, mut placement: Placement) -> Result<PlacementKey, GraphicsError> {
        let own = (placement.image_id(), placement.placement_id);
        let parent = placement.parent_ref();
        if self.forms_cycle(own, parent) {
            return Err(GraphicsError::Cycle);
        }
        if let Some((image, id)) = parent {
            if self.find(image, id).is_none() {
                return Err(GraphicsError::NoParent);
            }
        }

        placement.children.clear();
        if placement.placement_id != 0 {
            while let Some(index) = self
                .placements
                .iter()
                .position(|p| p.image_id() == own.0 && p.placement_id == own.1)
            {
                let replaced = self.placements.remove(index);
                log::debug!("replacing placement {} of image {}", own.1, own.0);
                self.forget_child(replaced.key);
                placement.children.extend(replaced.children);
            }
        }

        self.next_key += 1;
        let key = PlacementKey(self.next_key);
        placement.key = key;

        if let Some((image, id)) = parent {
            if let Some(parent) = self
                .placements
                .iter_mut()
                .find(|p| p.image_id() == image && p.placement_id == id)
            {
                parent.children.push(key);
            }
        }

        self.placements.push(placement);
        Ok(key)
    }

    /// Remove every placement matching `predicate` together with all of its
    /// descendants. Returns how many were removed.
    pub fn remove_where(&mut self, predicate: impl Fn(&Placement) -> bool) -> usize {
        let mut doomed: HashSet<PlacementKey> = HashSet::new();
        let mut queue: VecDeque<PlacementKey> = VecDeque::new();
        for placement in &self.placements {
            if predicate(placement) && doomed.insert(placement.key) {
                queue.push_back(placement.key);
            }
        }
        while let Some(key) = queue.pop_front() {
            let Some(placement) = self.get(key) else {
                continue;
            };
            for child in &placement.children {
                if doomed.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }

        if doomed.is_empty() {
            return 0;
        }
        let before = self.placements.len();
        self.placements.retain(|p| !doomed.contains(&p.key));
        for placement in &mut self.placements {
            placement.children.retain(|child| !doomed.contains(child));
        }
        let removed = before - self.placements.len();
        log::debug!("removed {removed} placements, {} remain", self.placements.len());
        removed
    }

    pub fn clear(&mut self) {
        self.placements.clear();
    }

    /// Top-left corner in pixels, following parent links.
    pub fn pixel_origin(&self, placement: &Placement, cell: CellSize) -> Option<PixelPoint> {
        self.pixel_origin_bounded(placement, cell, self.placements.len())
    }

    fn pixel_origin_bounded(
        &self,
        placement: &Placement,
        cell: CellSize,
        depth: usize,
    ) -> Option<PixelPoint> {
        match placement.origin {
            Origin::Absolute(coord) => {
                let offset = placement.pixel_offset.unwrap_or_default();
                Some(PixelPoint {
                    x: f64::from(coord.x) * cell.width + offset.x,
                    y: coord.y as f64 * cell.height + offset.y,
                })
            }
            Origin::Relative {
                parent_image,
                parent_placement,
                displacement,
            } => {
                let depth = depth.checked_sub(1)?;
                let parent = self.find(parent_image, parent_placement)?;
                let origin = self.pixel_origin_bounded(parent, cell, depth)?;
                Some(PixelPoint {
                    x: origin.x + f64::from(displacement.x) * cell.width,
                    y: origin.y + f64::from(displacement.y) * cell.height,
                })
            }
        }
    }

    /// Destination rectangle in pixels, or `None` if an ancestor is missing.
    pub fn pixel_rect(&self, placement: &Placement, cell: CellSize) -> Option<PixelRect> {
        let origin = self.pixel_origin(placement, cell)?;
        Some(PixelRect::from_origin_size(origin, placement.pixel_size(cell)))
    }

    /// Cells covered by the placement.
    pub fn covered_cells(&self, placement: &Placement, cell: CellSize) -> Option<GridRect> {
        Some(self.pixel_rect(placement, cell)?.covered_cells(cell))
    }

    pub fn intersects_column(&self, placement: &Placement, column: i64, cell: CellSize) -> bool {
        self.pixel_rect(placement, cell).is_some_and(|rect| {
            let start = column as f64 * cell.width;
            rect.overlaps_columns(start, start + cell.width)
        })
    }

    pub fn intersects_row(&self, placement: &Placement, row: i64, cell: CellSize) -> bool {
        self.pixel_rect(placement, cell).is_some_and(|rect| {
            let start = row as f64 * cell.height;
            rect.overlaps_rows(start, start + cell.height)
        })
    }

    pub fn intersects_cell(&self, placement: &Placement, column: i64, row: i64, cell: CellSize) -> bool {
        self.intersects_column(placement, column, cell) && self.intersects_row(placement, row, cell)
    }

    fn forget_child(&mut self, key: PlacementKey) {
        for placement in &mut self.placements {
            placement.children.retain(|child| *child != key);
        }
    }
}
