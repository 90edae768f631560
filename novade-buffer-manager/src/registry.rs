//! Index of live allocations.

use std::collections::HashMap;

use crate::hal::BufferHandle;

/// Identity of one allocation: the allocator key and its physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub key: i32,
    pub phy_addr: u64,
}

impl BufferKey {
    pub fn new(key: i32, phy_addr: u64) -> Self {
        Self { key, phy_addr }
    }

    pub fn of(handle: &BufferHandle) -> Self {
        Self::new(handle.key, handle.phy_addr)
    }
}

/// Owns the native handle of every buffer handed out by the allocator.
#[derive(Debug, Default)]
pub struct Registry {
    handles: HashMap<BufferKey, BufferHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle`, returning the handle it replaced, if any.
    pub fn insert(&mut self, handle: BufferHandle) -> Option<BufferHandle> {
        self.handles.insert(BufferKey::of(&handle), handle)
    }

    pub fn get(&self, key: &BufferKey) -> Option<&BufferHandle> {
        self.handles.get(key)
    }

    pub fn remove(&mut self, key: &BufferKey) -> Option<BufferHandle> {
        self.handles.remove(key)
    }

    pub fn contains(&self, key: &BufferKey) -> bool {
        self.handles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
