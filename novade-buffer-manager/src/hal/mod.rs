//! Boundary to the vendor hardware allocator.
//!
//! The vendor side is modelled as the [`Gralloc`] trait. Every entry point has
//! a default implementation returning [`HalError::EntryMissing`], so a backend
//! only provides what its hardware supports; the allocator treats a missing
//! entry as a failure for allocate/free/map/unmap and skips it for flushes.

pub mod software;

use std::num::NonZeroUsize;

use crate::error::{HalError, SurfaceError};
use crate::format::{HalPixelFormat, HardwareUsage};

pub use software::SoftwareGralloc;

pub type HalResult<T> = Result<T, HalError>;

/// One-time bring-up of a vendor allocator table.
pub type GrallocBringUp = Box<dyn FnOnce() -> HalResult<Box<dyn Gralloc>> + Send>;

/// Allocation request handed to [`Gralloc::alloc_mem`].
///
/// Size-based requests set [`HardwareUsage::ASSIGN_SIZE`] and `expected_size`;
/// geometry-based requests set `width`, `height` and `format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocInfo {
    pub width: u32,
    pub height: u32,
    pub expected_size: u32,
    pub format: HalPixelFormat,
    pub usage: HardwareUsage,
}

impl AllocInfo {
    pub fn with_size(expected_size: u32, format: HalPixelFormat, usage: HardwareUsage) -> Self {
        Self {
            width: 0,
            height: 0,
            expected_size,
            format,
            usage: usage | HardwareUsage::ASSIGN_SIZE,
        }
    }

    pub fn with_geometry(width: u32, height: u32, format: HalPixelFormat, usage: HardwareUsage) -> Self {
        Self {
            width,
            height,
            expected_size: 0,
            format,
            usage,
        }
    }

    pub fn is_size_based(&self) -> bool {
        self.usage.contains(HardwareUsage::ASSIGN_SIZE)
    }
}

/// Address of a CPU mapping. Never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtAddr(NonZeroUsize);

impl VirtAddr {
    /// Returns `None` for a null address.
    pub fn new(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(VirtAddr)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    pub fn as_mut_ptr(self) -> *mut u8 {
        self.0.get() as *mut u8
    }
}

/// The allocator's native description of one allocation.
///
/// The reserved slot vector always holds `reserve_fds + reserve_ints`
/// entries; the counts are only changed through [`BufferHandle::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferHandle {
    pub key: i32,
    pub phy_addr: u64,
    pub size: u32,
    pub stride: i32,
    pub usage: HardwareUsage,
    pub vir_addr: Option<VirtAddr>,
    reserve_fds: u32,
    reserve_ints: u32,
    reserve: Vec<i32>,
}

impl BufferHandle {
    /// Creates an empty handle with room for the given reserved slots.
    ///
    /// Fails with [`SurfaceError::SystemError`] if the slot storage cannot be
    /// allocated.
    pub fn new(reserve_fds: u32, reserve_ints: u32) -> Result<Self, SurfaceError> {
        let slots = reserve_fds as usize + reserve_ints as usize;
        let mut reserve = Vec::new();
        reserve.try_reserve_exact(slots).map_err(|_| SurfaceError::SystemError)?;
        reserve.resize(slots, 0);
        Ok(Self {
            key: 0,
            phy_addr: 0,
            size: 0,
            stride: 0,
            usage: HardwareUsage::empty(),
            vir_addr: None,
            reserve_fds,
            reserve_ints,
            reserve,
        })
    }

    pub fn reserve_fds(&self) -> u32 {
        self.reserve_fds
    }

    pub fn reserve_ints(&self) -> u32 {
        self.reserve_ints
    }

    /// Reserved slots: file descriptors first, then integers.
    pub fn reserve(&self) -> &[i32] {
        &self.reserve
    }

    pub fn reserve_mut(&mut self) -> &mut [i32] {
        &mut self.reserve
    }
}

/// Vendor allocator entry points.
pub trait Gralloc: Send + Sync {
    fn alloc_mem(&self, _info: &AllocInfo) -> HalResult<BufferHandle> {
        Err(HalError::EntryMissing("alloc_mem"))
    }

    fn free_mem(&self, _handle: &BufferHandle) -> HalResult<()> {
        Err(HalError::EntryMissing("free_mem"))
    }

    /// Maps the buffer; `0` means the mapping failed.
    fn mmap(&self, _handle: &BufferHandle) -> HalResult<usize> {
        Err(HalError::EntryMissing("mmap"))
    }

    /// Maps the buffer through the CPU cache; `0` means the mapping failed.
    fn mmap_cache(&self, _handle: &BufferHandle) -> HalResult<usize> {
        Err(HalError::EntryMissing("mmap_cache"))
    }

    fn unmap(&self, _handle: &BufferHandle) -> HalResult<()> {
        Err(HalError::EntryMissing("unmap"))
    }

    fn flush_cache(&self, _handle: &BufferHandle) -> HalResult<()> {
        Err(HalError::EntryMissing("flush_cache"))
    }

    /// Flushes the cache of a buffer mapped with [`Gralloc::mmap_cache`].
    fn flush_m_cache(&self, _handle: &BufferHandle) -> HalResult<()> {
        Err(HalError::EntryMissing("flush_m_cache"))
    }
}
