//! Typed key/value data attached to a surface buffer.
//!
//! Values are small integers (32 or 64 bits) keyed by a `u32`. The store keeps
//! insertion order, which is the order entries are written to a parcel.

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::SurfaceError;

/// Maximum number of entries a single buffer can carry.
pub const MAX_USER_DATA_COUNT: usize = 1000;

/// Type tag of an extension entry, as written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ExtraDataType {
    Int32 = 1,
    Int64 = 2,
}

impl ExtraDataType {
    /// Width in bytes of a value of this type.
    pub fn width(self) -> usize {
        match self {
            ExtraDataType::Int32 => 4,
            ExtraDataType::Int64 => 8,
        }
    }
}

impl TryFrom<u32> for ExtraDataType {
    type Error = SurfaceError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ExtraDataType::Int32),
            2 => Ok(ExtraDataType::Int64),
            _ => Err(SurfaceError::InvalidParam),
        }
    }
}

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraData {
    data_type: ExtraDataType,
    value: Vec<u8>,
}

impl ExtraData {
    pub fn data_type(&self) -> ExtraDataType {
        self.data_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.value
    }

    /// Decodes the value as a signed integer of its declared width.
    pub fn as_i64(&self) -> i64 {
        match self.data_type {
            ExtraDataType::Int32 => i64::from(i32::from_ne_bytes(array_of(&self.value))),
            ExtraDataType::Int64 => i64::from_ne_bytes(array_of(&self.value)),
        }
    }
}

fn array_of<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Insertion-ordered extension data of one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraDataStore {
    entries: IndexMap<u32, ExtraData>,
}

impl ExtraDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores `data` under `key` with the given raw type tag.
    ///
    /// The type must be Int32 or Int64 and `data` must be exactly that wide.
    /// A new key is refused once [`MAX_USER_DATA_COUNT`] entries exist.
    pub fn set_data(&mut self, key: u32, data_type: u32, data: &[u8]) -> Result<(), SurfaceError> {
        let data_type = match ExtraDataType::try_from(data_type) {
            Ok(t) if !data.is_empty() && data.len() <= 8 && data.len() == t.width() => t,
            _ => {
                info!("Invalid extra data for key {}: type {} with {} bytes", key, data_type, data.len());
                return Err(SurfaceError::InvalidParam);
            }
        };

        match self.entries.get_mut(&key) {
            Some(existing) if existing.value.len() == data.len() => {
                existing.value.copy_from_slice(data);
                existing.data_type = data_type;
                Ok(())
            }
            Some(existing) => {
                // Width changed: new storage is built before the old one is released.
                existing.value = fallible_copy(data)?;
                existing.data_type = data_type;
                Ok(())
            }
            None => {
                if self.entries.len() >= MAX_USER_DATA_COUNT {
                    info!("No more data can be saved because the storage space is full.");
                    return Err(SurfaceError::SystemError);
                }
                let value = fallible_copy(data)?;
                self.entries.insert(key, ExtraData { data_type, value });
                Ok(())
            }
        }
    }

    pub fn set_int32(&mut self, key: u32, value: i32) -> Result<(), SurfaceError> {
        self.set_data(key, ExtraDataType::Int32 as u32, &value.to_ne_bytes())
    }

    pub fn set_int64(&mut self, key: u32, value: i64) -> Result<(), SurfaceError> {
        self.set_data(key, ExtraDataType::Int64 as u32, &value.to_ne_bytes())
    }

    pub fn get(&self, key: u32) -> Option<&ExtraData> {
        self.entries.get(&key)
    }

    pub fn get_int32(&self, key: u32) -> Result<i32, SurfaceError> {
        self.typed(key, ExtraDataType::Int32)
            .map(|bytes| i32::from_ne_bytes(array_of(bytes)))
    }

    pub fn get_int64(&self, key: u32) -> Result<i64, SurfaceError> {
        self.typed(key, ExtraDataType::Int64)
            .map(|bytes| i64::from_ne_bytes(array_of(bytes)))
    }

    fn typed(&self, key: u32, wanted: ExtraDataType) -> Result<&[u8], SurfaceError> {
        match self.entries.get(&key) {
            Some(entry) if entry.data_type == wanted && entry.value.len() == wanted.width() => Ok(&entry.value),
            _ => Err(SurfaceError::InvalidParam),
        }
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &ExtraData)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn fallible_copy(data: &[u8]) -> Result<Vec<u8>, SurfaceError> {
    let mut value = Vec::new();
    if value.try_reserve_exact(data.len()).is_err() {
        warn!("Couldn't allocate {} bytes for ext data", data.len());
        return Err(SurfaceError::SystemError);
    }
    value.extend_from_slice(data);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_and_get_round_trip() {
        let mut store = ExtraDataStore::new();
        store.set_int32(1, -7).unwrap();
        store.set_int64(2, i64::MIN + 3).unwrap();
        assert_eq!(store.get_int32(1), Ok(-7));
        assert_eq!(store.get_int64(2), Ok(i64::MIN + 3));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_rejects_absent_key_and_type_mismatch() {
        let mut store = ExtraDataStore::new();
        store.set_int32(1, 5).unwrap();
        assert_eq!(store.get_int32(99), Err(SurfaceError::InvalidParam));
        assert_eq!(store.get_int64(1), Err(SurfaceError::InvalidParam));
    }

    #[test]
    fn test_set_data_validates_type_and_width() {
        let mut store = ExtraDataStore::new();
        assert_eq!(store.set_data(1, 0, &[1, 2, 3, 4]), Err(SurfaceError::InvalidParam));
        assert_eq!(store.set_data(1, 3, &[1, 2, 3, 4]), Err(SurfaceError::InvalidParam));
        assert_eq!(store.set_data(1, 1, &[]), Err(SurfaceError::InvalidParam));
        assert_eq!(store.set_data(1, 2, &[0; 9]), Err(SurfaceError::InvalidParam));
        assert_eq!(store.set_data(1, 1, &[0; 8]), Err(SurfaceError::InvalidParam));
        assert!(store.is_empty());
    }

    #[test]
    fn test_overwrite_with_different_width_replaces_storage() {
        let mut store = ExtraDataStore::new();
        for round in 0..64i64 {
            store.set_int32(7, round as i32).unwrap();
            assert_eq!(store.get(7).unwrap().bytes().len(), 4);
            store.set_int64(7, round << 40).unwrap();
            assert_eq!(store.get(7).unwrap().bytes().len(), 8);
            assert_eq!(store.get_int64(7), Ok(round << 40));
            assert_eq!(store.get_int32(7), Err(SurfaceError::InvalidParam));
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(7).unwrap().data_type(), ExtraDataType::Int64);
    }

    #[test]
    fn test_capacity_rejects_the_1001st_key() {
        let mut store = ExtraDataStore::new();
        for key in 0..MAX_USER_DATA_COUNT as u32 {
            store.set_int32(key, key as i32).unwrap();
        }
        assert_eq!(store.set_int32(5000, 1), Err(SurfaceError::SystemError));
        assert_eq!(store.len(), MAX_USER_DATA_COUNT);
        for key in 0..MAX_USER_DATA_COUNT as u32 {
            assert_eq!(store.get_int32(key), Ok(key as i32));
        }
        // Existing keys can still be updated at capacity.
        assert_eq!(store.set_int64(0, 1), Ok(()));
    }

    #[test]
    fn test_iteration_follows_insertion_order() {
        let mut store = ExtraDataStore::new();
        store.set_int32(30, 1).unwrap();
        store.set_int64(10, 2).unwrap();
        store.set_int32(20, 3).unwrap();
        store.set_int32(30, 4).unwrap();
        let keys: Vec<u32> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![30, 10, 20]);
        let values: Vec<i64> = store.iter().map(|(_, v)| v.as_i64()).collect();
        assert_eq!(values, vec![4, 2, 3]);
    }

    #[test]
    fn test_clear_empties_the_store() {
        let mut store = ExtraDataStore::new();
        store.set_int32(1, 1).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get_int32(1), Err(SurfaceError::InvalidParam));
    }
}
