//! Error types for the graphics protocol engine.
//!
//! [`GraphicsError`] renders to the exact text that goes after the `;` in a
//! protocol reply, so the reply encoder can use `to_string()` directly.
//! Codes follow the POSIX-style mnemonics the Kitty protocol uses.

use crate::protocol::command::Medium;

/// Errors reported back to the client through the reply mechanism.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// Both `i` and `I` were given on a transmission.
    #[error("EINVAL:Can't give both i and I")]
    IdAndNumber,

    /// Every identifier in `1..u32::MAX` is taken.
    #[error("ENOSPC:Out of identifiers")]
    OutOfIdentifiers,

    /// A chunk named a different image than the transfer in progress.
    #[error("EINVAL:Image ID mismatch in chunked transmission")]
    ChunkIdMismatch,

    /// The concatenated payload of a multipart transfer grew past the limit.
    #[error("EFBIG:Transmission exceeds {max} bytes")]
    TransmissionTooLarge { max: usize },

    /// A single image costs more than the whole cache budget.
    #[error("ENOSPC:Image exceeds cache budget")]
    ExceedsBudget,

    /// A put referred to an image that is not stored.
    #[error("ENOENT:Put command refers to non-existent image with id: {id} and number: {number}")]
    ImageNotFound { id: u32, number: u32 },

    /// The image vanished between storing it and displaying it.
    #[error("ENOENT:Image not found after transmission")]
    MissingAfterTransmission,

    /// Unicode-placeholder placements cannot be relative.
    #[error("EINVAL:Virtual placement cannot have a parent")]
    VirtualWithParent,

    /// Accepting the placement would make its parent chain loop.
    #[error("ECYCLE:Placement would form a cycle")]
    Cycle,

    /// A relative placement named a parent that does not exist.
    #[error("ENOPARENT:Parent placement not found")]
    NoParent,

    /// File, temporary-file and shared-memory media.
    #[error("EBADF:Unimplemented")]
    UnsupportedMedium(Medium),

    /// Bad base64 or a broken zlib stream.
    #[error("could not decode payload")]
    Decode,

    /// Decoded bytes do not form an image of the announced shape.
    #[error("invalid payload")]
    InvalidPayload,
}

impl GraphicsError {
    /// The mnemonic before the colon, if the message carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::IdAndNumber | Self::ChunkIdMismatch | Self::VirtualWithParent => Some("EINVAL"),
            Self::OutOfIdentifiers | Self::ExceedsBudget => Some("ENOSPC"),
            Self::TransmissionTooLarge { .. } => Some("EFBIG"),
            Self::ImageNotFound { .. } | Self::MissingAfterTransmission => Some("ENOENT"),
            Self::Cycle => Some("ECYCLE"),
            Self::NoParent => Some("ENOPARENT"),
            Self::UnsupportedMedium(_) => Some("EBADF"),
            Self::Decode | Self::InvalidPayload => None,
        }
    }
}

/// Reasons a command string could not be turned into a [`Command`].
///
/// The protocol has no addressee for these, so callers log and drop.
///
/// [`Command`]: crate::protocol::command::Command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A key holding an enumerated value had an unrecognized value.
    #[error("invalid value for key {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
