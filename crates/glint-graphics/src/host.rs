//! The terminal side of the graphics engine.
//!
//! [`GraphicsHost`] is everything the engine needs from the terminal that
//! embeds it: a way to answer the client, a redraw signal, and read access
//! to cursor and cell geometry. The host is passed into each call rather than
//! stored, so the engine never holds a reference into terminal state.

use crate::geometry::{CellSize, GridCoord};

/// Capabilities the embedding terminal provides.
///
/// Implementations must not call back into the
/// [`GraphicsController`](crate::controller::GraphicsController) from these
/// methods.
pub trait GraphicsHost {
    /// Write a complete reply escape sequence to the client.
    fn report(&mut self, message: &str);

    /// The set of drawable placements changed; schedule a redraw.
    fn placements_did_change(&mut self);

    /// Cursor position as an absolute grid coordinate (rows from the top of
    /// scrollback).
    fn cursor_coordinate(&self) -> GridCoord;

    /// Move the cursor by whole cells.
    fn move_cursor(&mut self, dx: i32, dy: i64);

    /// Size of one cell in pixels.
    fn cell_pixel_size(&self) -> CellSize;

    /// Absolute row of the first visible screen line, used to translate
    /// screen-relative coordinates in delete commands.
    fn screen_absolute_line(&self) -> i64;
}
