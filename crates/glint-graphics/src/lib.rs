//! Kitty terminal graphics protocol engine.
//!
//! This crate turns graphics escape sequences from a PTY byte stream into
//! decoded images and positioned placements, and hands the renderer an
//! ordered list of what to draw. It handles:
//!
//! - **Protocol parsing**: extracting APC bodies and decoding them into typed commands
//! - **Transfers**: reassembling multipart transmissions and decoding RGB, RGBA and PNG payloads
//! - **Image storage**: a cost-bounded cache with LRU eviction
//! - **Placements**: absolute and parent-relative placements with cycle detection and cascading delete
//! - **Replies**: `OK` / error answers honouring the client's verbosity
//!
//! # Architecture
//!
//! ```text
//! PTY byte stream
//!     │
//!     ▼
//! protocol::ApcScanner::feed()          ← split out ESC _ G ... ESC \ bodies
//!     │
//!     ▼
//! GraphicsController::execute_raw()     ← parse, accumulate, decode, store, place
//!     │                  │
//!     │                  └──► GraphicsHost::report()      ← replies to the client
//!     ▼
//! GraphicsController::draws()           ← ordered DrawInstructions for rendering
//! ```
//!
//! # Pixel Format
//!
//! Decoded bitmaps are RGBA, 8 bits per channel, rows top to bottom.
//! [`Bitmap::to_bgra`] produces the swizzled layout GPU backends usually want.
//!
//! # Memory Management
//!
//! The image store charges `width * height * 4` bytes per image against a
//! budget (default 320 MiB) and evicts the least-recently-used images when
//! it is exceeded. Placements survive eviction of their image but stop
//! drawing.

pub mod accumulator;
pub mod config;
pub mod controller;
pub mod decode;
pub mod draw;
pub mod error;
pub mod geometry;
pub mod host;
pub mod placement;
pub mod protocol;
pub mod store;
pub mod types;

// Re-export primary types for convenience.
pub use config::{ConfigError, GraphicsConfig};
pub use controller::GraphicsController;
pub use draw::{DrawInstruction, PlacementSize};
pub use error::{GraphicsError, ParseError};
pub use geometry::{CellSize, GridCoord, GridRect, PixelPoint, PixelRect, PixelSize};
pub use host::GraphicsHost;
pub use placement::{Placement, PlacementGraph, PlacementKey};
pub use store::ImageStore;
pub use types::{Bitmap, Image, ImageKey, LAST_IMAGE_KEY};
