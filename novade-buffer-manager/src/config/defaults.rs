//! Default configuration values.
//!
//! Referenced from `#[serde(default = "...")]` attributes in [`super::types`].

use std::path::PathBuf;

use super::types::{AllocatorConfig, HalBackend, LoggingConfig};
use crate::format::HalPixelFormat;

pub(super) fn default_allocator_config() -> AllocatorConfig {
    AllocatorConfig {
        backend: default_backend(),
        heap_limit: default_heap_limit(),
        stride_alignment: default_stride_alignment(),
        default_format: default_format(),
        reserve_fds: default_reserve_count(),
        reserve_ints: default_reserve_count(),
    }
}

pub(super) fn default_backend() -> HalBackend {
    HalBackend::Software
}

/// 256 MiB.
pub(super) fn default_heap_limit() -> u64 {
    256 * 1024 * 1024
}

pub(super) fn default_stride_alignment() -> u32 {
    16
}

/// Format handed to the allocator for size-based requests.
pub(super) fn default_format() -> HalPixelFormat {
    HalPixelFormat::Rgb565
}

pub(super) fn default_reserve_count() -> u32 {
    0
}

pub(super) fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file_path: default_log_file_path(),
        format: default_log_format(),
    }
}

pub(super) fn default_log_level() -> String {
    "info".to_string()
}

pub(super) fn default_log_file_path() -> Option<PathBuf> {
    None
}

pub(super) fn default_log_format() -> String {
    "text".to_string()
}
