//! Loading and validation of [`BufferManagerConfig`].
//!
//! [`ConfigLoader::load_from_path`] reads a TOML file;
//! [`ConfigLoader::load_from_str`] parses an in-memory document. Both run
//! [`ConfigLoader::validate_config`] on the result, which normalizes the log
//! level and format to lowercase.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::types::BufferManagerConfig;
use crate::buffer::MAX_RESERVE_SLOTS;
use crate::error::ConfigError;

/// Namespace for configuration loading.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads, parses and validates the configuration file at `path`.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<BufferManagerConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded buffer manager configuration from {}", path.display());
        Self::load_from_str(&content)
    }

    /// Parses and validates a TOML document.
    pub fn load_from_str(content: &str) -> Result<BufferManagerConfig, ConfigError> {
        let mut config: BufferManagerConfig = toml::from_str(content)?;
        Self::validate_config(&mut config)?;
        Ok(config)
    }

    /// Checks value ranges and normalizes string settings in place.
    pub fn validate_config(config: &mut BufferManagerConfig) -> Result<(), ConfigError> {
        let allocator = &config.allocator;
        if allocator.heap_limit == 0 {
            return Err(ConfigError::ValidationError(
                "allocator.heap_limit must be greater than 0".to_string(),
            ));
        }
        if !allocator.stride_alignment.is_power_of_two() {
            return Err(ConfigError::ValidationError(format!(
                "allocator.stride_alignment must be a power of two, got {}",
                allocator.stride_alignment
            )));
        }
        if u64::from(allocator.reserve_fds) + u64::from(allocator.reserve_ints) > u64::from(MAX_RESERVE_SLOTS) {
            return Err(ConfigError::ValidationError(format!(
                "allocator.reserve_fds + allocator.reserve_ints must not exceed {}",
                MAX_RESERVE_SLOTS
            )));
        }

        let level = config.logging.level.to_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => config.logging.level = level,
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: '{}'. Must be one of trace, debug, info, warn, error.",
                    config.logging.level
                )))
            }
        }

        let format = config.logging.format.to_lowercase();
        match format.as_str() {
            "text" | "json" => config.logging.format = format,
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: '{}'. Must be one of text, json.",
                    config.logging.format
                )))
            }
        }
        Ok(())
    }
}
