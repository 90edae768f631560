//! In-process allocator backend.
//!
//! Backs every allocation with a zeroed heap block. Used when no vendor
//! allocator is present (headless sessions, tests) and as the reference
//! behaviour for the [`Gralloc`] contract.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{AllocInfo, BufferHandle, Gralloc, HalResult, VirtAddr};
use crate::error::HalError;
use crate::format::HardwareUsage;

const PHYS_BASE: u64 = 0x8000_0000;
const PAGE_SIZE: u64 = 4096;

#[derive(Debug)]
struct Block {
    memory: Box<[u8]>,
    mapped: u32,
}

impl Block {
    fn address(&self) -> usize {
        self.memory.as_ptr() as usize
    }
}

#[derive(Debug)]
struct Heap {
    blocks: HashMap<(i32, u64), Block>,
    next_key: i32,
    next_phy: u64,
    in_use: u64,
}

/// Heap-backed implementation of every [`Gralloc`] entry point.
#[derive(Debug)]
pub struct SoftwareGralloc {
    heap: Mutex<Heap>,
    heap_limit: u64,
    stride_alignment: u32,
    reserve_fds: u32,
    reserve_ints: u32,
}

impl SoftwareGralloc {
    /// Creates a backend that hands out at most `heap_limit` bytes in total.
    ///
    /// `stride_alignment` must be a power of two; zero is treated as one.
    pub fn new(heap_limit: u64, stride_alignment: u32) -> Self {
        Self {
            heap: Mutex::new(Heap {
                blocks: HashMap::new(),
                next_key: 1,
                next_phy: PHYS_BASE,
                in_use: 0,
            }),
            heap_limit,
            stride_alignment: stride_alignment.max(1),
            reserve_fds: 0,
            reserve_ints: 0,
        }
    }

    /// Attaches reserved slots to every handle this backend creates.
    pub fn with_reserved_slots(mut self, reserve_fds: u32, reserve_ints: u32) -> Self {
        self.reserve_fds = reserve_fds;
        self.reserve_ints = reserve_ints;
        self
    }

    pub fn live_allocations(&self) -> usize {
        self.heap.lock().blocks.len()
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.heap.lock().in_use
    }

    /// Computes `(stride, size)` for a request.
    fn layout(&self, info: &AllocInfo) -> HalResult<(i32, u32)> {
        if info.is_size_based() {
            if info.expected_size == 0 {
                return Err(HalError::InvalidRequest("size-based request with zero size".to_string()));
            }
            return Ok((0, info.expected_size));
        }
        let bpp = info.format.bits_per_pixel().ok_or_else(|| {
            HalError::InvalidRequest(format!("format {:?} needs a size-based request", info.format))
        })?;
        if info.width == 0 || info.height == 0 {
            return Err(HalError::InvalidRequest(format!(
                "empty geometry {}x{}",
                info.width, info.height
            )));
        }
        let align = u64::from(self.stride_alignment);
        let row_bytes = (u64::from(info.width) * u64::from(bpp) + 7) / 8;
        let stride = (row_bytes + align - 1) / align * align;
        let mut size = stride * u64::from(info.height);
        if info.format.is_yuv420() {
            size = size * 3 / 2;
        }
        let stride = i32::try_from(stride)
            .map_err(|_| HalError::InvalidRequest(format!("stride {} out of range", stride)))?;
        let size = u32::try_from(size)
            .map_err(|_| HalError::InvalidRequest(format!("size {} out of range", size)))?;
        Ok((stride, size))
    }

    fn address_of(&self, handle: &BufferHandle) -> HalResult<usize> {
        let mut heap = self.heap.lock();
        let block = heap
            .blocks
            .get_mut(&(handle.key, handle.phy_addr))
            .ok_or(HalError::UnknownHandle { key: handle.key, phy_addr: handle.phy_addr })?;
        block.mapped += 1;
        Ok(block.address())
    }

    fn check_live(&self, handle: &BufferHandle) -> HalResult<()> {
        if self.heap.lock().blocks.contains_key(&(handle.key, handle.phy_addr)) {
            Ok(())
        } else {
            Err(HalError::UnknownHandle { key: handle.key, phy_addr: handle.phy_addr })
        }
    }
}

impl Gralloc for SoftwareGralloc {
    fn alloc_mem(&self, info: &AllocInfo) -> HalResult<BufferHandle> {
        let (stride, size) = self.layout(info)?;
        let mut heap = self.heap.lock();
        if heap.in_use + u64::from(size) > self.heap_limit {
            return Err(HalError::OutOfMemory { requested: u64::from(size) });
        }

        let mut memory = Vec::new();
        memory
            .try_reserve_exact(size as usize)
            .map_err(|_| HalError::OutOfMemory { requested: u64::from(size) })?;
        memory.resize(size as usize, 0u8);
        let block = Block { memory: memory.into_boxed_slice(), mapped: 0 };

        let mut handle = BufferHandle::new(self.reserve_fds, self.reserve_ints)
            .map_err(|_| HalError::OutOfMemory { requested: u64::from(size) })?;
        handle.key = heap.next_key;
        handle.phy_addr = heap.next_phy;
        handle.size = size;
        handle.stride = stride;
        handle.usage = info.usage;
        // Shared memory segments are attached at creation; media memory is
        // only reachable after an explicit map.
        if info.usage.contains(HardwareUsage::MEM_SHARE) {
            handle.vir_addr = VirtAddr::new(block.address());
        }

        heap.next_key = heap.next_key.wrapping_add(1).max(1);
        heap.next_phy += (u64::from(size) + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;
        heap.in_use += u64::from(size);
        heap.blocks.insert((handle.key, handle.phy_addr), block);
        debug!(
            "Software gralloc allocated key {} ({} bytes, stride {}) at {:#x}",
            handle.key, size, stride, handle.phy_addr
        );
        Ok(handle)
    }

    fn free_mem(&self, handle: &BufferHandle) -> HalResult<()> {
        let mut heap = self.heap.lock();
        let block = heap
            .blocks
            .remove(&(handle.key, handle.phy_addr))
            .ok_or(HalError::UnknownHandle { key: handle.key, phy_addr: handle.phy_addr })?;
        heap.in_use -= block.memory.len() as u64;
        debug!("Software gralloc released key {} at {:#x}", handle.key, handle.phy_addr);
        Ok(())
    }

    fn mmap(&self, handle: &BufferHandle) -> HalResult<usize> {
        self.address_of(handle)
    }

    fn mmap_cache(&self, handle: &BufferHandle) -> HalResult<usize> {
        self.address_of(handle)
    }

    fn unmap(&self, handle: &BufferHandle) -> HalResult<()> {
        let mut heap = self.heap.lock();
        let block = heap
            .blocks
            .get_mut(&(handle.key, handle.phy_addr))
            .ok_or(HalError::UnknownHandle { key: handle.key, phy_addr: handle.phy_addr })?;
        block.mapped = block.mapped.saturating_sub(1);
        Ok(())
    }

    fn flush_cache(&self, handle: &BufferHandle) -> HalResult<()> {
        trace!("Software gralloc flush_cache for key {}", handle.key);
        self.check_live(handle)
    }

    fn flush_m_cache(&self, handle: &BufferHandle) -> HalResult<()> {
        trace!("Software gralloc flush_m_cache for key {}", handle.key);
        self.check_live(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::HalPixelFormat;

    fn gralloc() -> SoftwareGralloc {
        SoftwareGralloc::new(1 << 20, 16)
    }

    #[test]
    fn test_geometry_layout_aligns_stride() {
        let g = gralloc();
        let handle = g
            .alloc_mem(&AllocInfo::with_geometry(10, 4, HalPixelFormat::Rgb888, HardwareUsage::MEM_MMZ))
            .unwrap();
        // 10 * 3 = 30 bytes per row, aligned to 32.
        assert_eq!(handle.stride, 32);
        assert_eq!(handle.size, 128);
        assert!(handle.vir_addr.is_none(), "media memory is not mapped at allocation");
    }

    #[test]
    fn test_yuv420_layout_adds_chroma_planes() {
        let g = gralloc();
        let handle = g
            .alloc_mem(&AllocInfo::with_geometry(16, 16, HalPixelFormat::Ycbcr420Sp, HardwareUsage::MEM_MMZ))
            .unwrap();
        assert_eq!(handle.stride, 16);
        assert_eq!(handle.size, 16 * 16 * 3 / 2);
    }

    #[test]
    fn test_size_based_request_uses_expected_size() {
        let g = gralloc();
        let handle = g
            .alloc_mem(&AllocInfo::with_size(1000, HalPixelFormat::Rgb565, HardwareUsage::MEM_SHARE))
            .unwrap();
        assert_eq!(handle.size, 1000);
        assert!(handle.vir_addr.is_some(), "shared memory is attached at allocation");
        assert_eq!(g.bytes_in_use(), 1000);
    }

    #[test]
    fn test_rejects_unusable_requests() {
        let g = gralloc();
        assert!(matches!(
            g.alloc_mem(&AllocInfo::with_geometry(8, 8, HalPixelFormat::Butt, HardwareUsage::MEM_MMZ)),
            Err(HalError::InvalidRequest(_))
        ));
        assert!(matches!(
            g.alloc_mem(&AllocInfo::with_geometry(0, 8, HalPixelFormat::Rgb565, HardwareUsage::MEM_MMZ)),
            Err(HalError::InvalidRequest(_))
        ));
        assert!(matches!(
            g.alloc_mem(&AllocInfo::with_size(0, HalPixelFormat::Butt, HardwareUsage::MEM_SHARE)),
            Err(HalError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_heap_limit_is_enforced() {
        let g = SoftwareGralloc::new(4096, 4);
        g.alloc_mem(&AllocInfo::with_size(4000, HalPixelFormat::Butt, HardwareUsage::MEM_SHARE)).unwrap();
        assert_eq!(
            g.alloc_mem(&AllocInfo::with_size(200, HalPixelFormat::Butt, HardwareUsage::MEM_SHARE)),
            Err(HalError::OutOfMemory { requested: 200 })
        );
    }

    #[test]
    fn test_allocations_get_distinct_identities() {
        let g = gralloc();
        let a = g.alloc_mem(&AllocInfo::with_size(10, HalPixelFormat::Butt, HardwareUsage::MEM_SHARE)).unwrap();
        let b = g.alloc_mem(&AllocInfo::with_size(10, HalPixelFormat::Butt, HardwareUsage::MEM_SHARE)).unwrap();
        assert_ne!(a.key, b.key);
        assert_ne!(a.phy_addr, b.phy_addr);
        assert_eq!(b.phy_addr - a.phy_addr, PAGE_SIZE);
    }

    #[test]
    fn test_map_flush_and_free() {
        let g = SoftwareGralloc::new(1 << 20, 4).with_reserved_slots(1, 2);
        let handle = g
            .alloc_mem(&AllocInfo::with_geometry(4, 4, HalPixelFormat::Rgba8888, HardwareUsage::MEM_MMZ_CACHE))
            .unwrap();
        assert_eq!(handle.reserve().len(), 3);
        assert_ne!(g.mmap(&handle).unwrap(), 0);
        assert_eq!(g.mmap(&handle).unwrap(), g.mmap_cache(&handle).unwrap());
        assert_eq!(g.flush_cache(&handle), Ok(()));
        assert_eq!(g.flush_m_cache(&handle), Ok(()));
        assert_eq!(g.unmap(&handle), Ok(()));
        assert_eq!(g.free_mem(&handle), Ok(()));
        assert_eq!(g.live_allocations(), 0);
        assert_eq!(g.bytes_in_use(), 0);
        assert!(matches!(g.flush_cache(&handle), Err(HalError::UnknownHandle { .. })));
        assert!(matches!(g.free_mem(&handle), Err(HalError::UnknownHandle { .. })));
    }
}
