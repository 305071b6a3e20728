//! Multipart transmission reassembly.
//!
//! Large images arrive as a run of transmit commands, each with `m=1` except
//! the last. Only one transfer can be open at a time. Chunks after the first
//! contribute their payload only; the first chunk's parameters (and the
//! display parameters of a first `a=T` chunk) describe the whole transfer.

use crate::config::TransferConfig;
use crate::error::GraphicsError;
use crate::protocol::command::{ImageDisplay, ImageTransmission, More};

/// A transfer, open or just completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub transmission: ImageTransmission,
    /// Concatenated base64 payload.
    pub payload: String,
    /// Started by `a=q`.
    pub query: bool,
    /// Display parameters to apply once the image is stored.
    pub display: Option<ImageDisplay>,
}

/// Outcome of feeding one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// More chunks are expected; nothing to do yet.
    Pending,
    /// The transfer is complete and ready to decode.
    Complete(Transfer),
}

#[derive(Debug, Default)]
pub struct Accumulator {
    pending: Option<Transfer>,
    config: TransferConfig,
}

impl Accumulator {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            pending: None,
            config,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The open transfer, if any.
    pub fn pending(&self) -> Option<&Transfer> {
        self.pending.as_ref()
    }

    /// Drop any open transfer.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Add one transmit command to the current transfer.
    pub fn feed(
        &mut self,
        transmission: ImageTransmission,
        payload: &str,
        query: bool,
        display: Option<ImageDisplay>,
    ) -> Result<Feed, GraphicsError> {
        if let Some(pending) = &self.pending {
            if self.config.reject_mismatched_chunks
                && ids_conflict(pending.transmission.identifier, transmission.identifier)
            {
                log::debug!(
                    "chunk for image {} abandons pending transfer for image {}",
                    transmission.identifier,
                    pending.transmission.identifier
                );
                self.pending = None;
                if transmission.expects_more() {
                    return Err(GraphicsError::ChunkIdMismatch);
                }
                return self.feed(transmission, payload, query, display);
            }
        }

        let max = self.config.max_accumulated_bytes;
        let Some(mut pending) = self.pending.take() else {
            if payload.len() > max {
                return Err(GraphicsError::TransmissionTooLarge { max });
            }
            let transfer = Transfer {
                transmission,
                payload: payload.to_string(),
                query,
                display,
            };
            if transfer.transmission.expects_more() {
                log::trace!("starting multipart transfer, {} bytes", payload.len());
                self.pending = Some(transfer);
                return Ok(Feed::Pending);
            }
            return Ok(Feed::Complete(transfer));
        };

        if pending.payload.len() + payload.len() > max {
            log::debug!("multipart transfer exceeds {max} bytes, discarding");
            return Err(GraphicsError::TransmissionTooLarge { max });
        }
        pending.payload.push_str(payload);

        if transmission.expects_more() {
            self.pending = Some(pending);
            return Ok(Feed::Pending);
        }

        log::trace!("multipart transfer complete, {} bytes", pending.payload.len());
        pending.transmission.more = More::FinalChunk;
        pending.display = pending.display.or(display);
        Ok(Feed::Complete(pending))
    }
}

fn ids_conflict(pending: u32, incoming: u32) -> bool {
    pending != 0 && incoming != 0 && pending != incoming
}
