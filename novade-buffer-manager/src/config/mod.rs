//! Configuration for the buffer manager.
//!
//! - [`types`]: the [`BufferManagerConfig`] schema and its sections.
//! - [`defaults`]: values used for fields missing from a configuration file.
//! - [`loader`]: [`ConfigLoader`], which reads, parses and validates TOML.
//!
//! ```rust,ignore
//! use novade_buffer_manager::config::ConfigLoader;
//!
//! let config = ConfigLoader::load_from_path("/etc/novade/buffer-manager.toml")?;
//! novade_buffer_manager::logging::init_logging(&config.logging, false)?;
//! let allocator = novade_buffer_manager::BufferAllocator::from_config(&config.allocator);
//! ```

pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{AllocatorConfig, BufferManagerConfig, HalBackend, LoggingConfig};
