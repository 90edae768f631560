//! # Novade Buffer Manager
//!
//! Hardware-backed surface buffers shared between a producing client and the
//! Novade compositor.
//!
//! The crate translates portable pixel formats and usages into the codes of a
//! vendor allocator ([`format`]), drives that allocator through the
//! [`hal::Gralloc`] trait while tracking live allocations
//! ([`BufferAllocator`]), and describes every allocation as a
//! [`SurfaceBuffer`] with typed extension data and a parcel encoding that can
//! cross a process boundary ([`parcel`]).
//!
//! ```
//! use novade_buffer_manager::{BufferAllocator, ConsumerUsage, PixelFormat};
//! use novade_buffer_manager::config::AllocatorConfig;
//!
//! let mut allocator = BufferAllocator::from_config(&AllocatorConfig::default());
//! allocator.init().unwrap();
//! let mut buffer = allocator
//!     .alloc_buffer(64, 64, PixelFormat::Argb8888.into(), ConsumerUsage::Software.into())
//!     .unwrap();
//! allocator.map_buffer(&mut buffer).unwrap();
//! assert!(buffer.vir_addr().is_some());
//!
//! let mut slot = Some(buffer);
//! allocator.free_buffer(&mut slot);
//! assert!(slot.is_none());
//! ```

pub mod allocator;
pub mod buffer;
pub mod config;
pub mod error;
pub mod extra_data;
pub mod format;
pub mod hal;
pub mod logging;
pub mod parcel;
pub mod registry;

pub use allocator::{BestEffort, BufferAllocator, SharedAllocator};
pub use buffer::{SharedSurfaceBuffer, SurfaceBuffer, MAX_RESERVE_SLOTS};
pub use error::{status_of, HalError, SurfaceError, WireError, SURFACE_ERROR_OK};
pub use extra_data::{ExtraDataStore, ExtraDataType, MAX_USER_DATA_COUNT};
pub use format::{convert_format, convert_usage, ConsumerUsage, HalPixelFormat, HardwareUsage, PixelFormat};
pub use parcel::{Parcel, ParcelReader};
