//! The buffer allocator.
//!
//! [`BufferAllocator`] owns the hardware allocator table and the
//! [`Registry`] of live handles. It is constructed explicitly and brought up
//! once with [`BufferAllocator::init`]; there is no process-wide instance.
//! Methods that change the registry take `&mut self`, so callers sharing one
//! allocator across threads wrap it in a single lock (see [`SharedAllocator`]).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::buffer::SurfaceBuffer;
use crate::config::{AllocatorConfig, HalBackend};
use crate::error::{HalError, SurfaceError};
use crate::format::{convert_format, convert_usage, ConsumerUsage, HalPixelFormat};
use crate::hal::{AllocInfo, BufferHandle, Gralloc, GrallocBringUp, SoftwareGralloc, VirtAddr};
use crate::registry::{BufferKey, Registry};

/// An allocator shared by several producers.
pub type SharedAllocator = Arc<Mutex<BufferAllocator>>;

/// Outcome of an operation whose failure callers may ignore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    /// The hardware allocator performed the operation.
    Done,
    /// Nothing needed to be done.
    Skipped,
    /// The hardware allocator failed; the failure has been logged.
    Failed(HalError),
}

impl BestEffort {
    pub fn is_failed(&self) -> bool {
        matches!(self, BestEffort::Failed(_))
    }
}

enum HalState {
    Uninitialized(GrallocBringUp),
    Ready(Box<dyn Gralloc>),
    Failed,
}

impl fmt::Debug for HalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalState::Uninitialized(_) => f.write_str("Uninitialized"),
            HalState::Ready(_) => f.write_str("Ready"),
            HalState::Failed => f.write_str("Failed"),
        }
    }
}

/// Allocates, maps and releases hardware-backed surface buffers.
#[derive(Debug)]
pub struct BufferAllocator {
    state: HalState,
    registry: Registry,
    default_format: HalPixelFormat,
}

impl BufferAllocator {
    /// Creates an allocator that runs `bring_up` on the first [`init`](Self::init).
    pub fn new(bring_up: GrallocBringUp) -> Self {
        Self {
            state: HalState::Uninitialized(bring_up),
            registry: Registry::new(),
            default_format: HalPixelFormat::Rgb565,
        }
    }

    /// Creates an allocator around an already available table.
    pub fn with_gralloc(gralloc: Box<dyn Gralloc>) -> Self {
        Self {
            state: HalState::Ready(gralloc),
            registry: Registry::new(),
            default_format: HalPixelFormat::Rgb565,
        }
    }

    /// Creates an uninitialized allocator for the configured backend.
    pub fn from_config(config: &AllocatorConfig) -> Self {
        let bring_up: GrallocBringUp = match config.backend {
            HalBackend::Software => {
                let (limit, alignment) = (config.heap_limit, config.stride_alignment);
                let (fds, ints) = (config.reserve_fds, config.reserve_ints);
                Box::new(move || {
                    let gralloc = SoftwareGralloc::new(limit, alignment).with_reserved_slots(fds, ints);
                    Ok(Box::new(gralloc) as Box<dyn Gralloc>)
                })
            }
            HalBackend::Disabled => {
                Box::new(|| Err(HalError::InitFailed("no hardware allocator is configured".to_string())))
            }
        };
        Self::new(bring_up).with_default_format(config.default_format)
    }

    /// Sets the allocator format used by [`alloc_buffer_with_size`](Self::alloc_buffer_with_size).
    pub fn with_default_format(mut self, format: HalPixelFormat) -> Self {
        self.default_format = format;
        self
    }

    /// Brings up the hardware allocator.
    ///
    /// Runs the bring-up at most once. Later calls report the outcome of that
    /// first attempt; a failed bring-up is permanent.
    pub fn init(&mut self) -> Result<(), SurfaceError> {
        let bring_up = match std::mem::replace(&mut self.state, HalState::Failed) {
            HalState::Uninitialized(bring_up) => bring_up,
            HalState::Ready(gralloc) => {
                info!("BufferAllocator has init succeed.");
                self.state = HalState::Ready(gralloc);
                return Ok(());
            }
            HalState::Failed => return Err(SurfaceError::NotReady),
        };
        match bring_up() {
            Ok(gralloc) => {
                self.state = HalState::Ready(gralloc);
                info!("BufferAllocator init succeed.");
                Ok(())
            }
            Err(e) => {
                warn!("BufferAllocator init failed: {}", e);
                Err(SurfaceError::NotReady)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, HalState::Ready(_))
    }

    fn gralloc(&self) -> Result<&dyn Gralloc, SurfaceError> {
        match &self.state {
            HalState::Ready(gralloc) => Ok(gralloc.as_ref()),
            _ => {
                debug!("BufferAllocator not init.");
                Err(SurfaceError::NotReady)
            }
        }
    }

    /// Whether a handle with this identity is currently registered.
    pub fn is_registered(&self, key: i32, phy_addr: u64) -> bool {
        self.registry.contains(&BufferKey::new(key, phy_addr))
    }

    /// Number of buffers allocated and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.registry.len()
    }

    /// Allocates `size` bytes with the given portable usage.
    pub fn alloc_buffer_with_size(&mut self, size: u32, usage: u32) -> Result<SurfaceBuffer, SurfaceError> {
        let hw_usage = convert_usage(usage).map_err(|e| {
            warn!("Alloc graphic buffer failed --- conversion usage.");
            e
        })?;
        let info = AllocInfo::with_size(size, self.default_format, hw_usage);
        self.alloc_with(&info, usage)
    }

    /// Allocates a `width` x `height` buffer of a portable pixel format.
    pub fn alloc_buffer(&mut self, width: u32, height: u32, format: u32, usage: u32) -> Result<SurfaceBuffer, SurfaceError> {
        let hw_usage = convert_usage(usage).map_err(|e| {
            warn!("Alloc graphic buffer failed --- conversion usage.");
            e
        })?;
        let hw_format = convert_format(format).map_err(|e| {
            warn!("Alloc graphic buffer failed --- conversion format.");
            e
        })?;
        let info = AllocInfo::with_geometry(width, height, hw_format, hw_usage);
        self.alloc_with(&info, usage)
    }

    fn alloc_with(&mut self, info: &AllocInfo, usage: u32) -> Result<SurfaceBuffer, SurfaceError> {
        let gralloc = self.gralloc()?;
        let handle = gralloc.alloc_mem(info).map_err(|e| {
            warn!("Alloc graphic buffer failed: {}", e);
            SurfaceError::from(e)
        })?;

        let buffer = match SurfaceBuffer::from_handle(&handle, usage) {
            Ok(buffer) => buffer,
            Err(e) => {
                if let Err(free_err) = gralloc.free_mem(&handle) {
                    warn!("Releasing handle {} after failed descriptor setup failed: {}", handle.key, free_err);
                }
                warn!("Alloc buffer failed to build descriptor.");
                return Err(e);
            }
        };

        if let Some(stale) = self.registry.insert(handle) {
            warn!("Allocator reused key {} at {:#x}; previous handle dropped", stale.key, stale.phy_addr);
        }
        info!("Alloc buffer succeed: key {}, {} bytes.", buffer.key(), buffer.size());
        Ok(buffer)
    }

    /// Releases the buffer in `slot` and clears the slot.
    ///
    /// An empty slot or a buffer this allocator does not know is left alone.
    /// If the hardware allocator refuses the release, the buffer stays
    /// registered and in the slot.
    pub fn free_buffer(&mut self, slot: &mut Option<SurfaceBuffer>) -> BestEffort {
        let buffer_key = match slot.as_ref() {
            Some(buffer) => BufferKey::new(buffer.key(), buffer.phy_addr()),
            None => {
                warn!("Input param buffer is null.");
                return BestEffort::Skipped;
            }
        };
        let gralloc = match self.gralloc() {
            Ok(gralloc) => gralloc,
            Err(_) => return BestEffort::Skipped,
        };
        let handle = match self.registry.get(&buffer_key) {
            Some(handle) => handle,
            None => {
                debug!("Buffer key {} is not registered; nothing to free.", buffer_key.key);
                return BestEffort::Skipped;
            }
        };
        if let Err(e) = gralloc.free_mem(handle) {
            warn!("Free buffer {} failed: {}", buffer_key.key, e);
            return BestEffort::Failed(e);
        }
        self.registry.remove(&buffer_key);
        *slot = None;
        info!("Free buffer succeed.");
        BestEffort::Done
    }

    /// Builds a short-lived native handle for a descriptor.
    fn transient_handle(buffer: &SurfaceBuffer) -> Result<(BufferHandle, ConsumerUsage), SurfaceError> {
        let usage = ConsumerUsage::try_from(buffer.usage()).map_err(|e| {
            warn!("Conversion usage failed.");
            e
        })?;
        let mut handle = buffer.to_handle()?;
        handle.usage = convert_usage(usage.into())?;
        Ok((handle, usage))
    }

    /// Maps the buffer into this process and records the address.
    pub fn map_buffer(&self, buffer: &mut SurfaceBuffer) -> Result<(), SurfaceError> {
        let gralloc = self.gralloc()?;
        let (handle, usage) = Self::transient_handle(buffer)?;
        let mapped = match usage {
            ConsumerUsage::Software | ConsumerUsage::Hardware | ConsumerUsage::HardwareConsumerCache => {
                gralloc.mmap(&handle)
            }
            ConsumerUsage::HardwareProducerCache => gralloc.mmap_cache(&handle),
        };
        let addr = match mapped {
            Ok(addr) => VirtAddr::new(addr),
            Err(e) => {
                warn!("Map Buffer error: {}", e);
                return Err(SurfaceError::from(e));
            }
        };
        match addr {
            Some(addr) => {
                buffer.set_vir_addr(Some(addr));
                debug!("Map Buffer succeed: key {} at {:#x}.", buffer.key(), addr.get());
                Ok(())
            }
            None => {
                warn!("Map Buffer error: null address for key {}.", buffer.key());
                Err(SurfaceError::SystemError)
            }
        }
    }

    /// Unmaps the buffer. Failures are logged and reported, never raised.
    pub fn unmap_buffer(&self, buffer: &mut SurfaceBuffer) -> BestEffort {
        let gralloc = match self.gralloc() {
            Ok(gralloc) => gralloc,
            Err(_) => return BestEffort::Skipped,
        };
        let handle = match Self::transient_handle(buffer) {
            Ok((handle, _)) => handle,
            Err(_) => return BestEffort::Skipped,
        };
        match gralloc.unmap(&handle) {
            Ok(()) => {
                buffer.set_vir_addr(None);
                BestEffort::Done
            }
            Err(e) => {
                warn!("Umap buffer failed: {}", e);
                BestEffort::Failed(e)
            }
        }
    }

    /// Flushes CPU caches of a cache-enabled buffer.
    ///
    /// Consumer-cache buffers use the cache flush entry, producer-cache
    /// buffers the mapped-cache flush; other usages need no flush. A failing
    /// flush is logged and reported in the outcome; the call still succeeds.
    pub fn flush_cache(&self, buffer: &SurfaceBuffer) -> Result<BestEffort, SurfaceError> {
        let gralloc = self.gralloc()?;
        let (handle, usage) = Self::transient_handle(buffer)?;
        let flushed = match usage {
            ConsumerUsage::HardwareConsumerCache => gralloc.flush_cache(&handle),
            ConsumerUsage::HardwareProducerCache => gralloc.flush_m_cache(&handle),
            ConsumerUsage::Software | ConsumerUsage::Hardware => return Ok(BestEffort::Skipped),
        };
        Ok(match flushed {
            Ok(()) => BestEffort::Done,
            Err(e) => {
                warn!("Flush cache buffer failed: {}", e);
                BestEffort::Failed(e)
            }
        })
    }
}
