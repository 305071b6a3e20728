//! Command execution.
//!
//! [`GraphicsController`] owns the image store, the pixel pool, the
//! multipart accumulator and the placement graph, and applies one parsed
//! command at a time to them. Replies and redraw signals go out through the
//! [`GraphicsHost`] passed into each call.
//!
//! Decoded pixels live in a pool keyed by image uuid rather than inside the
//! store, so that eviction can drop pixels while placements keep the image
//! metadata they need for geometry. Pool entries that neither the store nor
//! any placement refers to are pruned after every command.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::accumulator::{Accumulator, Feed, Transfer};
use crate::config::GraphicsConfig;
use crate::decode::decode_transmission;
use crate::draw::DrawInstruction;
use crate::error::GraphicsError;
use crate::geometry::{PixelPoint, PixelRect};
use crate::host::GraphicsHost;
use crate::placement::{Displacement, Origin, Placement, PlacementGraph, PlacementKey};
use crate::protocol::command::{
    Action, Command, CommandKind, CursorMovement, DeleteImage, DeleteSelector, ImageDisplay,
    ImageTransmission, Verbosity,
};
use crate::protocol::parse_kitty_command;
use crate::protocol::response::Response;
use crate::store::ImageStore;
use crate::types::{Bitmap, Image, ImageKey, LAST_IMAGE_KEY};

/// The graphics protocol engine for one terminal.
#[derive(Debug)]
pub struct GraphicsController {
    config: GraphicsConfig,
    images: ImageStore<Image>,
    pixels: HashMap<Uuid, Arc<Bitmap>>,
    accumulator: Accumulator,
    placements: PlacementGraph,
    next_sequence: u64,
}

impl Default for GraphicsController {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsController {
    pub fn new() -> Self {
        Self::with_config(GraphicsConfig::default())
    }

    pub fn with_config(config: GraphicsConfig) -> Self {
        Self {
            images: ImageStore::with_budget(config.cache.budget_bytes),
            pixels: HashMap::new(),
            accumulator: Accumulator::new(config.transfer.clone()),
            placements: PlacementGraph::new(),
            next_sequence: 0,
            config,
        }
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    pub fn images(&self) -> &ImageStore<Image> {
        &self.images
    }

    pub fn placements(&self) -> &PlacementGraph {
        &self.placements
    }

    /// Stored image with protocol id `id`, without touching recency.
    pub fn image(&self, id: u32) -> Option<&Image> {
        self.images.peek(ImageKey::from(id))
    }

    /// Decoded pixels of an image, if still held.
    pub fn bitmap(&self, uuid: &Uuid) -> Option<&Arc<Bitmap>> {
        self.pixels.get(uuid)
    }

    /// Whether a multipart transfer is waiting for more chunks.
    pub fn is_receiving(&self) -> bool {
        self.accumulator.is_pending()
    }

    /// Parse and execute the body of one `ESC _ G ... ESC \` sequence.
    ///
    /// Malformed commands have nobody to answer to and are dropped.
    pub fn execute_raw(&mut self, body: &[u8], host: &mut dyn GraphicsHost) {
        match parse_kitty_command(body) {
            Ok(command) => self.execute(command, host),
            Err(e) => log::debug!("dropping malformed graphics command: {e}"),
        }
    }

    pub fn execute(&mut self, command: Command, host: &mut dyn GraphicsHost) {
        let Command {
            action,
            kind,
            payload,
        } = command;
        log::debug!("graphics command {action:?}, payload {} bytes", payload.len());

        match kind {
            CommandKind::Transmission(transmission) => {
                self.execute_transmit(transmission, None, &payload, action == Action::Query, host);
            }
            CommandKind::TransmitAndDisplay(transmission, display) => {
                self.execute_transmit(transmission, Some(display), &payload, false, host);
            }
            CommandKind::Display(display) => self.execute_display(&display, host),
            CommandKind::Delete(delete) => self.execute_delete(&delete, host),
            CommandKind::AnimationFrameLoading(_)
            | CommandKind::AnimationFrameComposition(_)
            | CommandKind::AnimationControl(_) => {
                log::debug!("animation command {action:?} is not supported, ignoring");
            }
        }

        self.prune_pixels();
    }

    /// Drop every image, placement and partial transfer.
    pub fn clear(&mut self, host: &mut dyn GraphicsHost) {
        log::debug!("clearing {} images and {} placements", self.images.len(), self.placements.len());
        self.images.clear();
        self.pixels.clear();
        self.accumulator.reset();
        let had_placements = !self.placements.is_empty();
        self.placements.clear();
        if had_placements {
            host.placements_did_change();
        }
    }

    /// Everything to paint, ordered bottom to top.
    ///
    /// Placements whose parent chain is broken or whose pixels were evicted
    /// are skipped. Equal z-indices are ordered by image id; beyond that the
    /// order is unspecified.
    pub fn draws(&self, host: &dyn GraphicsHost) -> Vec<DrawInstruction> {
        let cell = host.cell_pixel_size();
        let mut draws: Vec<DrawInstruction> = self
            .placements
            .iter()
            .filter_map(|placement| {
                let destination = self.placements.pixel_rect(placement, cell)?;
                let bitmap = self.pixels.get(&placement.image.uuid)?;
                Some(DrawInstruction::new(placement, destination, Arc::clone(bitmap)))
            })
            .collect();
        draws.sort_by_key(|draw| (draw.z_index, draw.image_id));
        draws
    }

    fn execute_transmit(
        &mut self,
        mut transmission: ImageTransmission,
        display: Option<ImageDisplay>,
        payload: &str,
        query: bool,
        host: &mut dyn GraphicsHost,
    ) {
        if transmission.allocation_allowed && transmission.image_number > 0 {
            if transmission.identifier > 0 {
                let response = Response::from_result(Err(GraphicsError::IdAndNumber));
                respond_to_transmit(host, &transmission, display.as_ref(), response);
                return;
            }
            let Some(id) = self.images.allocate_identifier() else {
                let response = Response::from_result(Err(GraphicsError::OutOfIdentifiers));
                respond_to_transmit(host, &transmission, display.as_ref(), response);
                return;
            };
            log::debug!("allocated image id {id} for number {}", transmission.image_number);
            transmission.identifier = id;
            transmission.allocation_allowed = false;
        }

        // Errors on a continuation chunk are answered with the parameters
        // of the transfer's first chunk.
        let (first, first_display) = match self.accumulator.pending() {
            Some(pending) => (pending.transmission.clone(), pending.display.clone()),
            None => (transmission.clone(), display.clone()),
        };
        let transfer = match self.accumulator.feed(transmission, payload, query, display) {
            Ok(Feed::Pending) => return,
            Ok(Feed::Complete(transfer)) => transfer,
            Err(e) => {
                log::debug!("transfer rejected: {e}");
                // Reported even mid-transfer: the client has to start over.
                let response = transfer_params(&first, first_display.as_ref(), Response::from_result(Err(e)));
                send(host, first.verbosity, response);
                return;
            }
        };

        let stored = self.store_transfer(&transfer);
        let result = match (&stored, &transfer.display) {
            (Err(e), _) => Err(e.clone()),
            (Ok(_), None) => Ok(()),
            (Ok(key), Some(display)) => match self.images.get(*key).cloned() {
                Some(image) => self.place(display, image, host),
                None => Err(GraphicsError::MissingAfterTransmission),
            },
        };
        if let Err(e) = &result {
            log::debug!("transmission of image {} failed: {e}", transfer.transmission.identifier);
        }
        respond_to_transmit(
            host,
            &transfer.transmission,
            transfer.display.as_ref(),
            Response::from_result(result),
        );
    }

    /// Decode a finished transfer and put it in the store.
    fn store_transfer(&mut self, transfer: &Transfer) -> Result<ImageKey, GraphicsError> {
        let max_inflated = usize::try_from(self.config.cache.budget_bytes).unwrap_or(usize::MAX);
        let bitmap = decode_transmission(&transfer.transmission, &transfer.payload, max_inflated)?;

        self.next_sequence += 1;
        let image = Image::new(self.next_sequence, transfer.transmission.clone(), &bitmap);
        let key = if !transfer.query && image.identifier() != 0 {
            ImageKey::from(image.identifier())
        } else {
            LAST_IMAGE_KEY
        };
        let (uuid, cost) = (image.uuid, image.cost());
        log::debug!(
            "storing {}x{} image under key {key} ({cost} bytes)",
            image.width,
            image.height
        );

        self.pixels.insert(uuid, Arc::new(bitmap));
        let mut rejected = false;
        for (_, evicted) in self.images.insert(key, image, cost) {
            self.pixels.remove(&evicted.uuid);
            rejected |= evicted.uuid == uuid;
        }
        if rejected {
            return Err(GraphicsError::ExceedsBudget);
        }
        Ok(key)
    }

    fn execute_display(&mut self, display: &ImageDisplay, host: &mut dyn GraphicsHost) {
        let image = if display.identifier != 0 {
            self.images.get(ImageKey::from(display.identifier)).cloned()
        } else if display.number != 0 {
            self.newest_with_number(display.number)
                .and_then(|key| self.images.get(key).cloned())
        } else {
            match self.images.get(LAST_IMAGE_KEY).cloned() {
                Some(image) => Some(image),
                None => {
                    log::debug!("put without an image id and nothing transmitted yet");
                    return;
                }
            }
        };

        let result = match image {
            Some(image) => self.place(display, image, host),
            None => Err(GraphicsError::ImageNotFound {
                id: display.identifier,
                number: display.number,
            }),
        };
        if let Err(e) = &result {
            log::debug!("put of image {} rejected: {e}", display.identifier);
        }
        let response = Response::from_result(result)
            .param('i', display.identifier)
            .param('I', display.number)
            .param('p', display.placement);
        send(host, display.verbosity, response);
    }

    /// Create a placement of `image` from `display`.
    fn place(
        &mut self,
        display: &ImageDisplay,
        image: Image,
        host: &mut dyn GraphicsHost,
    ) -> Result<(), GraphicsError> {
        let is_virtual = display.unicode_placeholder;
        if is_virtual && (display.parent_image.is_some() || display.parent_placement.is_some()) {
            return Err(GraphicsError::VirtualWithParent);
        }

        let origin = match (display.parent_image, display.parent_placement) {
            (Some(parent_image), Some(parent_placement)) => Origin::Relative {
                parent_image,
                parent_placement,
                displacement: Displacement {
                    x: display.horizontal_offset,
                    y: display.vertical_offset,
                },
            },
            _ => Origin::Absolute(host.cursor_coordinate()),
        };

        let source_rect = source_rect(display, &image);
        let mut placement = Placement::new(image, display.placement, origin);
        if display.pixel_offset_x > 0 || display.pixel_offset_y > 0 {
            placement.pixel_offset = Some(PixelPoint {
                x: f64::from(display.pixel_offset_x),
                y: f64::from(display.pixel_offset_y),
            });
        }
        placement.source_rect = source_rect;
        placement.rows = (display.rows > 0).then_some(display.rows);
        placement.columns = (display.columns > 0).then_some(display.columns);
        placement.z_index = display.z_index;
        placement.is_virtual = is_virtual;

        let key = self.placements.insert(placement)?;
        log::debug!(
            "placed image {} as placement {}, {} placements total",
            display.identifier,
            display.placement,
            self.placements.len()
        );
        host.placements_did_change();

        // Relative and virtual placements never move the cursor.
        if display.cursor_movement == CursorMovement::AfterImage
            && display.parent_placement.is_none()
            && !is_virtual
        {
            let cell = host.cell_pixel_size();
            let cells = self
                .placements
                .get(key)
                .and_then(|placement| self.placements.covered_cells(placement, cell));
            if let Some(cells) = cells {
                host.move_cursor(cells.columns, cells.rows);
            }
        }
        Ok(())
    }

    fn execute_delete(&mut self, delete: &DeleteImage, host: &mut dyn GraphicsHost) {
        let before = self.placements.len();
        let rules = self.config.deletion.clone();
        let spare_virtual = rules.spare_virtual_placements;
        let on_screen = move |p: &Placement| !(spare_virtual && p.is_virtual);
        log::debug!("delete {:?}, {before} placements", delete.selector);

        match &delete.selector {
            DeleteSelector::Everything => {
                if rules.clear_all_removes_images {
                    self.images.clear();
                }
                self.placements.clear();
            }
            DeleteSelector::AllPlacements => {
                self.remove_placements(|_, p| on_screen(p));
            }
            DeleteSelector::ImageId => {
                if delete.placement_id != 0 {
                    self.remove_placements(|_, p| {
                        p.image_id() == delete.image_id && p.placement_id == delete.placement_id
                    });
                } else {
                    self.remove_image(ImageKey::from(delete.image_id), rules.cascade_on_id);
                }
            }
            DeleteSelector::ImageNumber => {
                if let Some(key) = self.newest_with_number(delete.number) {
                    if delete.placement_id != 0 {
                        let id = self.images.peek(key).map_or(0, Image::identifier);
                        self.remove_placements(|_, p| {
                            p.image_id() == id && p.placement_id == delete.placement_id
                        });
                    } else {
                        self.remove_image(key, rules.cascade_on_number);
                    }
                }
            }
            DeleteSelector::Cursor => {
                let cursor = host.cursor_coordinate();
                let cell = host.cell_pixel_size();
                self.remove_placements(|graph, p| {
                    on_screen(p) && graph.intersects_cell(p, i64::from(cursor.x), cursor.y, cell)
                });
            }
            DeleteSelector::Cell => {
                let column = i64::from(delete.x) - 1;
                let row = i64::from(delete.y) - 1 + host.screen_absolute_line();
                let cell = host.cell_pixel_size();
                self.remove_placements(|graph, p| {
                    on_screen(p) && graph.intersects_cell(p, column, row, cell)
                });
            }
            DeleteSelector::CellAtZIndex => {
                let column = i64::from(delete.x);
                let row = i64::from(delete.y) + host.screen_absolute_line();
                let cell = host.cell_pixel_size();
                self.remove_placements(|graph, p| {
                    on_screen(p)
                        && p.z_index == delete.z
                        && graph.intersects_cell(p, column, row, cell)
                });
            }
            DeleteSelector::IdRange => {
                let range = ImageKey::from(delete.x)..=ImageKey::from(delete.y);
                let doomed: Vec<ImageKey> = self.images.keys().filter(|key| range.contains(key)).collect();
                for key in doomed {
                    self.remove_image(key, rules.cascade_on_range);
                }
            }
            DeleteSelector::Column => {
                let column = i64::from(delete.x) - 1;
                let cell = host.cell_pixel_size();
                self.remove_placements(|graph, p| on_screen(p) && graph.intersects_column(p, column, cell));
            }
            DeleteSelector::Row => {
                let row = i64::from(delete.y) - 1 + host.screen_absolute_line();
                let cell = host.cell_pixel_size();
                self.remove_placements(|graph, p| on_screen(p) && graph.intersects_row(p, row, cell));
            }
            DeleteSelector::ZIndex => {
                self.remove_placements(|_, p| on_screen(p) && p.z_index == delete.z);
            }
            DeleteSelector::AnimationFrames => {
                log::debug!("animation frame deletion is not supported, ignoring");
            }
            DeleteSelector::Unrecognized(selector) => {
                log::trace!("ignoring unknown delete selector {selector:?}");
            }
        }

        if self.placements.len() != before {
            host.placements_did_change();
        }
    }

    /// Remove placements matching `predicate`, and their descendants.
    fn remove_placements(&mut self, predicate: impl Fn(&PlacementGraph, &Placement) -> bool) {
        let graph = &self.placements;
        let doomed: HashSet<PlacementKey> = graph
            .iter()
            .filter(|&p| predicate(graph, p))
            .map(Placement::key)
            .collect();
        if !doomed.is_empty() {
            self.placements.remove_where(|p| doomed.contains(&p.key()));
        }
    }

    fn remove_image(&mut self, key: ImageKey, cascade: bool) {
        if self.images.remove(key).is_some() {
            log::debug!("removed image {key}");
        }
        if cascade {
            if let Ok(id) = u32::try_from(key) {
                self.remove_placements(|_, p| p.image_id() == id);
            }
        }
    }

    /// Key of the most recently created image with client number `number`.
    fn newest_with_number(&self, number: u32) -> Option<ImageKey> {
        self.images
            .iter()
            .filter(|(_, image)| image.number() == number)
            .max_by_key(|(_, image)| image.sequence)
            .map(|(key, _)| key)
    }

    fn prune_pixels(&mut self) {
        let live: HashSet<Uuid> = self
            .images
            .iter()
            .map(|(_, image)| image.uuid)
            .chain(self.placements.iter().map(|p| p.image.uuid))
            .collect();
        self.pixels.retain(|uuid, _| live.contains(uuid));
    }
}

/// Source rectangle requested by `x`, `y`, `w`, `h`; a zero width or height
/// extends to the image edge.
fn source_rect(display: &ImageDisplay, image: &Image) -> Option<PixelRect> {
    if display.source_x == 0
        && display.source_y == 0
        && display.source_width == 0
        && display.source_height == 0
    {
        return None;
    }
    let x = f64::from(display.source_x);
    let y = f64::from(display.source_y);
    let width = match display.source_width {
        0 => (f64::from(image.width) - x).max(0.0),
        w => f64::from(w),
    };
    let height = match display.source_height {
        0 => (f64::from(image.height) - y).max(0.0),
        h => f64::from(h),
    };
    Some(PixelRect::new(x, y, width, height))
}

fn transfer_params(
    transmission: &ImageTransmission,
    display: Option<&ImageDisplay>,
    response: Response,
) -> Response {
    response
        .param('i', transmission.identifier)
        .param('I', transmission.image_number)
        .param('p', display.map_or(0, |d| d.placement))
}

/// Reply to a transmission; nothing is sent while more chunks are expected.
fn respond_to_transmit(
    host: &mut dyn GraphicsHost,
    transmission: &ImageTransmission,
    display: Option<&ImageDisplay>,
    response: Response,
) {
    if transmission.expects_more() {
        return;
    }
    send(host, transmission.verbosity, transfer_params(transmission, display, response));
}

fn send(host: &mut dyn GraphicsHost, verbosity: Verbosity, response: Response) {
    if response.is_wanted(verbosity) {
        host.report(&response.encode());
    }
}
