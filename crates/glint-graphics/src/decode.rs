//! Payload decoding: base64, optional zlib, then raw pixels or PNG.

use std::io::Read;

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use flate2::read::ZlibDecoder;

use crate::error::GraphicsError;
use crate::protocol::command::{Compression, Format, ImageTransmission, Medium};
use crate::types::Bitmap;

/// Standard alphabet; clients are inconsistent about trailing `=`.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Turn a complete transmission into a bitmap.
///
/// `max_inflated_bytes` bounds the output of zlib inflation.
pub fn decode_transmission(
    transmission: &ImageTransmission,
    payload: &str,
    max_inflated_bytes: usize,
) -> Result<Bitmap, GraphicsError> {
    if transmission.medium != Medium::Direct {
        return Err(GraphicsError::UnsupportedMedium(transmission.medium));
    }

    let mut bytes = PAYLOAD_ENGINE.decode(payload).map_err(|e| {
        log::debug!("base64 decode failed: {e}");
        GraphicsError::Decode
    })?;
    if transmission.compression == Compression::Zlib {
        bytes = inflate(&bytes, max_inflated_bytes)?;
    }

    let (width, height) = (transmission.width, transmission.height);
    let bitmap = match transmission.format {
        Format::Raw24 => Bitmap::from_rgb(width, height, &bytes),
        Format::Raw32 => Bitmap::from_rgba(width, height, bytes),
        Format::Png => decode_png(&bytes),
    };
    bitmap.ok_or(GraphicsError::InvalidPayload)
}

fn inflate(compressed: &[u8], limit: usize) -> Result<Vec<u8>, GraphicsError> {
    let mut out = Vec::new();
    // One byte past the limit tells an exact fit from an overflow.
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    ZlibDecoder::new(compressed)
        .take(cap)
        .read_to_end(&mut out)
        .map_err(|e| {
            log::debug!("zlib inflate failed: {e}");
            GraphicsError::Decode
        })?;
    if out.len() > limit {
        log::debug!("zlib payload inflates past {limit} bytes");
        return Err(GraphicsError::ExceedsBudget);
    }
    Ok(out)
}

fn decode_png(bytes: &[u8]) -> Option<Bitmap> {
    let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| log::debug!("PNG decode failed: {e}"))
        .ok()?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    Bitmap::from_rgba(width, height, decoded.into_raw())
}
