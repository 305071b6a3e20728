//! Tunables for the graphics engine.
//!
//! Every field has a default, so a config file is optional and may set any
//! subset of keys:
//!
//! ```toml
//! [cache]
//! budget_bytes = 335544320
//!
//! [transfer]
//! max_accumulated_bytes = 67108864
//! reject_mismatched_chunks = false
//!
//! [deletion]
//! clear_all_removes_images = true
//! cascade_on_id = true
//! cascade_on_number = true
//! cascade_on_range = true
//! spare_virtual_placements = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::DEFAULT_BUDGET_BYTES;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct GraphicsConfig {
    pub cache: CacheConfig,
    pub transfer: TransferConfig,
    pub deletion: DeletionConfig,
}

impl GraphicsConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: GraphicsConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "No graphics config found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        log::info!("Loading graphics config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.budget_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "cache.budget_bytes must be greater than 0".to_string(),
            ));
        }
        if self.transfer.max_accumulated_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "transfer.max_accumulated_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Image cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Total decoded bytes (width * height * 4 * frames) kept in memory.
    pub budget_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
        }
    }
}

/// Multipart transmission limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct TransferConfig {
    /// Cap on the concatenated payload of one multipart transfer.
    pub max_accumulated_bytes: usize,
    /// Treat a chunk naming a different non-zero image id as the start of a
    /// new transfer instead of folding it into the pending one.
    pub reject_mismatched_chunks: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_accumulated_bytes: 64 * 1024 * 1024,
            reject_mismatched_chunks: false,
        }
    }
}

/// How delete commands treat cases the protocol leaves open.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct DeletionConfig {
    /// `d=` (empty) drops stored images too, not only placements.
    pub clear_all_removes_images: bool,
    /// `d=i` without `p` also removes the image's placements.
    pub cascade_on_id: bool,
    /// `d=n` without `p` also removes the image's placements.
    pub cascade_on_number: bool,
    /// `d=r` also removes the placements of every image in range.
    pub cascade_on_range: bool,
    /// Selectors a, c, p, q, x, y and z leave virtual placements alone, as
    /// kitty does. Off by default: those selectors remove every match.
    pub spare_virtual_placements: bool,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            clear_all_removes_images: true,
            cascade_on_id: true,
            cascade_on_number: true,
            cascade_on_range: true,
            spare_virtual_placements: false,
        }
    }
}
