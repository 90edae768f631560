//! The surface buffer descriptor.
//!
//! A [`SurfaceBuffer`] is the producer/consumer-visible view of one
//! allocation: the fields of the allocator's [`BufferHandle`], the length of
//! valid data and the buffer's extension data. It is created by the
//! [`BufferAllocator`](crate::allocator::BufferAllocator), travels between
//! processes through [`SurfaceBuffer::write_to_parcel`] and
//! [`SurfaceBuffer::read_from_parcel`], and is destroyed by
//! [`BufferAllocator::free_buffer`](crate::allocator::BufferAllocator::free_buffer).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{SurfaceError, WireError};
use crate::extra_data::{ExtraDataStore, ExtraDataType, MAX_USER_DATA_COUNT};
use crate::hal::{BufferHandle, VirtAddr};
use crate::parcel::{Parcel, ParcelReader};

/// Most reserved slots (fds plus ints) a descriptor can carry.
pub const MAX_RESERVE_SLOTS: u32 = 64;

fn reserved_slots(fds: u32, ints: u32) -> Option<usize> {
    fds.checked_add(ints)
        .filter(|slots| *slots <= MAX_RESERVE_SLOTS)
        .map(|slots| slots as usize)
}

/// A descriptor shared between a queue and its producer.
pub type SharedSurfaceBuffer = Arc<Mutex<SurfaceBuffer>>;

/// One allocated buffer.
///
/// `usage` holds the portable [`ConsumerUsage`](crate::format::ConsumerUsage)
/// value as a raw `u32`; it is translated again whenever the allocator needs
/// the hardware usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBuffer {
    key: i32,
    phy_addr: u64,
    size: u32,
    usage: u32,
    stride: i32,
    vir_addr: Option<VirtAddr>,
    reserve_fds: u32,
    reserve_ints: u32,
    reserve: Vec<i32>,
    data_len: u32,
    extra: ExtraDataStore,
}

impl SurfaceBuffer {
    /// An unallocated descriptor. Mostly useful as a decode target.
    pub fn empty() -> Self {
        Self {
            key: 0,
            phy_addr: 0,
            size: 0,
            usage: 0,
            stride: 0,
            vir_addr: None,
            reserve_fds: 0,
            reserve_ints: 0,
            reserve: Vec::new(),
            data_len: 0,
            extra: ExtraDataStore::new(),
        }
    }

    /// Builds a descriptor from a freshly allocated handle.
    ///
    /// Fails with [`SurfaceError::InvalidParam`] if the handle has more than
    /// [`MAX_RESERVE_SLOTS`] reserved slots, and with
    /// [`SurfaceError::SystemError`] if the slots cannot be copied.
    pub fn from_handle(handle: &BufferHandle, usage: u32) -> Result<Self, SurfaceError> {
        if reserved_slots(handle.reserve_fds(), handle.reserve_ints()).is_none() {
            warn!(
                "Handle {} carries {} + {} reserved slots; at most {} fit a descriptor",
                handle.key,
                handle.reserve_fds(),
                handle.reserve_ints(),
                MAX_RESERVE_SLOTS
            );
            return Err(SurfaceError::InvalidParam);
        }
        let mut reserve = Vec::new();
        reserve
            .try_reserve_exact(handle.reserve().len())
            .map_err(|_| SurfaceError::SystemError)?;
        reserve.extend_from_slice(handle.reserve());
        Ok(Self {
            key: handle.key,
            phy_addr: handle.phy_addr,
            size: handle.size,
            usage,
            stride: handle.stride,
            vir_addr: handle.vir_addr,
            reserve_fds: handle.reserve_fds(),
            reserve_ints: handle.reserve_ints(),
            reserve,
            data_len: 0,
            extra: ExtraDataStore::new(),
        })
    }

    /// Rebuilds a native handle with this descriptor's current field values.
    ///
    /// The hardware usage is left empty; the allocator fills it in from the
    /// translated portable usage.
    pub fn to_handle(&self) -> Result<BufferHandle, SurfaceError> {
        let mut handle = BufferHandle::new(self.reserve_fds, self.reserve_ints)?;
        handle.key = self.key;
        handle.phy_addr = self.phy_addr;
        handle.size = self.size;
        handle.stride = self.stride;
        handle.vir_addr = self.vir_addr;
        let slots = handle.reserve_mut();
        let n = slots.len().min(self.reserve.len());
        slots[..n].copy_from_slice(&self.reserve[..n]);
        Ok(handle)
    }

    pub fn key(&self) -> i32 {
        self.key
    }

    pub fn phy_addr(&self) -> u64 {
        self.phy_addr
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn usage(&self) -> u32 {
        self.usage
    }

    pub fn stride(&self) -> i32 {
        self.stride
    }

    pub fn vir_addr(&self) -> Option<VirtAddr> {
        self.vir_addr
    }

    pub(crate) fn set_vir_addr(&mut self, addr: Option<VirtAddr>) {
        self.vir_addr = addr;
    }

    pub fn reserve_fds(&self) -> u32 {
        self.reserve_fds
    }

    pub fn reserve_ints(&self) -> u32 {
        self.reserve_ints
    }

    pub fn reserve(&self) -> &[i32] {
        &self.reserve
    }

    pub fn data_len(&self) -> u32 {
        self.data_len
    }

    pub fn set_data_len(&mut self, len: u32) {
        self.data_len = len;
    }

    pub fn extra_data(&self) -> &ExtraDataStore {
        &self.extra
    }

    pub fn set_int32(&mut self, key: u32, value: i32) -> Result<(), SurfaceError> {
        self.extra.set_int32(key, value)
    }

    pub fn set_int64(&mut self, key: u32, value: i64) -> Result<(), SurfaceError> {
        self.extra.set_int64(key, value)
    }

    pub fn get_int32(&self, key: u32) -> Result<i32, SurfaceError> {
        self.extra.get_int32(key)
    }

    pub fn get_int64(&self, key: u32) -> Result<i64, SurfaceError> {
        self.extra.get_int64(key)
    }

    /// See [`ExtraDataStore::set_data`].
    pub fn set_data(&mut self, key: u32, data_type: u32, data: &[u8]) -> Result<(), SurfaceError> {
        self.extra.set_data(key, data_type, data)
    }

    pub fn clear_extra_data(&mut self) {
        self.extra.clear();
    }

    /// Moves the data length and every extension entry out of `source`.
    ///
    /// Entries already present here are dropped. `source` is left with no
    /// extension data and a zero data length.
    pub fn copy_extra_data(&mut self, source: &mut SurfaceBuffer) {
        self.data_len = std::mem::take(&mut source.data_len);
        self.extra = std::mem::take(&mut source.extra);
    }

    /// Writes the descriptor header and its extension entries.
    pub fn write_to_parcel(&self, parcel: &mut Parcel) {
        parcel.write_i32(self.key);
        parcel.write_u64(self.phy_addr);
        parcel.write_u32(self.reserve_fds);
        parcel.write_u32(self.reserve_ints);
        parcel.write_u32(self.size);
        parcel.write_u32(self.usage);
        parcel.write_u32(self.data_len);
        parcel.write_u32(self.extra.len() as u32);
        for (key, entry) in self.extra.iter() {
            parcel.write_u32(key);
            parcel.write_u32(entry.data_type() as u32);
            match entry.data_type() {
                ExtraDataType::Int32 => parcel.write_i32(entry.as_i64() as i32),
                ExtraDataType::Int64 => parcel.write_i64(entry.as_i64()),
            }
        }
    }

    /// Reads a descriptor written by [`SurfaceBuffer::write_to_parcel`].
    ///
    /// The reserved slot counts must fit [`MAX_RESERVE_SLOTS`]; the slot
    /// values themselves are not on the wire and decode as zero.
    /// Extension entries are only read when the count is in `1..1000`.
    /// An entry with an unknown type tag is skipped without consuming a
    /// value, so any entries after it are read out of step with the writer.
    pub fn read_from_parcel(reader: &mut ParcelReader<'_>) -> Result<Self, WireError> {
        let mut buffer = SurfaceBuffer::empty();
        buffer.key = reader.read_i32()?;
        buffer.phy_addr = reader.read_u64()?;
        let fds = reader.read_u32()?;
        let ints = reader.read_u32()?;
        let slots = reserved_slots(fds, ints).ok_or(WireError::TooManyReservedSlots {
            fds,
            ints,
            max: MAX_RESERVE_SLOTS,
        })?;
        buffer.reserve_fds = fds;
        buffer.reserve_ints = ints;
        buffer.reserve = vec![0; slots];
        buffer.size = reader.read_u32()?;
        buffer.usage = reader.read_u32()?;
        buffer.data_len = reader.read_u32()?;
        let count = reader.read_u32()? as usize;
        if count == 0 || count >= MAX_USER_DATA_COUNT {
            if count != 0 {
                warn!("Ignoring {} extension entries in descriptor for key {}", count, buffer.key);
            }
            return Ok(buffer);
        }

        for _ in 0..count {
            let key = reader.read_u32()?;
            let tag = reader.read_u32()?;
            let stored = match ExtraDataType::try_from(tag) {
                Ok(ExtraDataType::Int32) => buffer.extra.set_int32(key, reader.read_i32()?),
                Ok(ExtraDataType::Int64) => buffer.extra.set_int64(key, reader.read_i64()?),
                Err(_) => {
                    debug!("Skipping extension entry {} with unknown type {}", key, tag);
                    continue;
                }
            };
            if stored.is_err() {
                warn!("Dropping extension entry {} of descriptor {}", key, buffer.key);
            }
        }
        Ok(buffer)
    }
}

impl Default for SurfaceBuffer {
    fn default() -> Self {
        Self::empty()
    }
}
