//! Core image types.
//!
//! Decoded pixels are held as tightly packed **RGBA8**, the layout PNG
//! decoding produces. Raw RGB transmissions are expanded to RGBA on arrival
//! so every [`Bitmap`] has the same stride rules.

use uuid::Uuid;

use crate::geometry::PixelSize;
use crate::protocol::command::ImageTransmission;

/// Key into the image store.
///
/// Protocol ids are 32-bit; the extra range holds [`LAST_IMAGE_KEY`].
pub type ImageKey = u64;

/// Store slot for the most recent id-less or query transmission.
pub const LAST_IMAGE_KEY: ImageKey = u32::MAX as u64 + 1;

/// Decoded pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Bitmap {
    /// Wrap an RGBA buffer. `None` unless it holds exactly `width * height`
    /// pixels.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = pixel_count(width, height)?.checked_mul(4)?;
        (rgba.len() == expected).then_some(Self { width, height, rgba })
    }

    /// Expand an RGB buffer to RGBA with opaque alpha.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Option<Self> {
        let expected = pixel_count(width, height)?.checked_mul(3)?;
        if rgb.len() != expected {
            return None;
        }
        let mut rgba = Vec::with_capacity(expected / 3 * 4);
        for chunk in rgb.chunks_exact(3) {
            rgba.extend_from_slice(chunk);
            rgba.push(0xff);
        }
        Some(Self { width, height, rgba })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> PixelSize {
        PixelSize {
            width: f64::from(self.width),
            height: f64::from(self.height),
        }
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Copy of the pixels with red and blue swapped, for BGRA textures.
    pub fn to_bgra(&self) -> Vec<u8> {
        let mut bgra = self.rgba.clone();
        for chunk in bgra.chunks_exact_mut(4) {
            chunk.swap(0, 2);
        }
        bgra
    }

    pub fn byte_size(&self) -> usize {
        self.rgba.len()
    }
}

fn pixel_count(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    usize::try_from(width).ok()?.checked_mul(usize::try_from(height).ok()?)
}

/// A stored image: identity plus the metadata placements need for geometry.
///
/// Pixels are kept apart, keyed by [`Image::uuid`], so that evicting them
/// leaves every copy of this record intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Creation order; larger is newer.
    pub sequence: u64,
    /// Identity that survives id reuse.
    pub uuid: Uuid,
    /// Parameters of the transmission that produced this image.
    pub metadata: ImageTransmission,
    /// Decoded width in pixels.
    pub width: u32,
    /// Decoded height in pixels.
    pub height: u32,
    pub frame_count: u32,
}

impl Image {
    pub fn new(sequence: u64, metadata: ImageTransmission, bitmap: &Bitmap) -> Self {
        Self {
            sequence,
            uuid: Uuid::new_v4(),
            metadata,
            width: bitmap.width(),
            height: bitmap.height(),
            frame_count: 1,
        }
    }

    /// Client-assigned id (`i`), 0 when the image was stored without one.
    pub fn identifier(&self) -> u32 {
        self.metadata.identifier
    }

    /// Client-assigned number (`I`).
    pub fn number(&self) -> u32 {
        self.metadata.image_number
    }

    pub fn size(&self) -> PixelSize {
        PixelSize {
            width: f64::from(self.width),
            height: f64::from(self.height),
        }
    }

    /// Bytes charged against the cache budget.
    pub fn cost(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4 * u64::from(self.frame_count)
    }
}
