//! Configuration data structures.
//!
//! All structs reject unknown fields and fill missing ones from
//! [`super::defaults`].
//!
//! ```
//! use novade_buffer_manager::config::{BufferManagerConfig, HalBackend};
//!
//! let toml_str = r#"
//! [allocator]
//! heap_limit = 1048576
//! default_format = "rgba8888"
//!
//! [logging]
//! level = "debug"
//! "#;
//! let config: BufferManagerConfig = toml::from_str(toml_str).unwrap();
//! assert_eq!(config.allocator.backend, HalBackend::Software);
//! assert_eq!(config.allocator.heap_limit, 1048576);
//! assert_eq!(config.logging.format, "text");
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use super::defaults;
use crate::format::HalPixelFormat;

/// Which hardware allocator implementation backs the buffer allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalBackend {
    /// In-process heap allocator.
    Software,
    /// No allocator is available; bring-up fails and every allocation
    /// reports not ready.
    Disabled,
}

/// Settings of the buffer allocator and its hardware backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocatorConfig {
    #[serde(default = "defaults::default_backend")]
    pub backend: HalBackend,
    /// Upper bound on bytes held by live allocations.
    #[serde(default = "defaults::default_heap_limit")]
    pub heap_limit: u64,
    /// Row alignment in bytes. Must be a power of two.
    #[serde(default = "defaults::default_stride_alignment")]
    pub stride_alignment: u32,
    /// Allocator format used for size-based requests.
    #[serde(default = "defaults::default_format")]
    pub default_format: HalPixelFormat,
    #[serde(default = "defaults::default_reserve_count")]
    pub reserve_fds: u32,
    #[serde(default = "defaults::default_reserve_count")]
    pub reserve_ints: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        defaults::default_allocator_config()
    }
}

/// Settings of the logging subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of "trace", "debug", "info", "warn", "error" (case-insensitive).
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    /// Log file; file logging is off when `None`.
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    /// "text" or "json".
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        defaults::default_logging_config()
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferManagerConfig {
    #[serde(default = "defaults::default_allocator_config")]
    pub allocator: AllocatorConfig,
    #[serde(default = "defaults::default_logging_config")]
    pub logging: LoggingConfig,
}
