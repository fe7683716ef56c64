//! Process-wide handle map: translates opaque 32-bit handles into local
//! object references. `0` is reserved as the invalid handle.
//!
//! An owning slot arena rather than a linked list: insert/get/remove are all
//! O(1) amortized, and the single mutex is kept only because the map really
//! is shared process-wide state.

use std::sync::Mutex;

/// Reserved invalid handle value; `HandleMap` never hands this out.
pub const INVALID_HANDLE: u32 = 0;

struct Inner<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

/// A process-wide (or scoped, nothing stops multiple instances) handle
/// table. `T` is typically a cheaply-cloneable handle itself (`Arc<...>`).
pub struct HandleMap<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleMap<T> {
    pub fn new() -> Self {
        HandleMap {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Insert `value`, returning a fresh nonzero handle.
    pub fn insert(&self, value: T) -> u32 {
        let mut inner = self.inner.lock().expect("handle map poisoned");
        if let Some(slot) = inner.free.pop() {
            let idx = (slot - 1) as usize;
            inner.slots[idx] = Some(value);
            slot
        } else {
            inner.slots.push(Some(value));
            inner.slots.len() as u32
        }
    }

    /// Remove and return the value behind `handle`, if still present.
    pub fn remove(&self, handle: u32) -> Option<T> {
        if handle == INVALID_HANDLE {
            return None;
        }
        let mut inner = self.inner.lock().expect("handle map poisoned");
        let idx = (handle - 1) as usize;
        let taken = inner.slots.get_mut(idx).and_then(|slot| slot.take());
        if taken.is_some() {
            inner.free.push(handle);
        }
        taken
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("handle map poisoned");
        inner.slots.len() - inner.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> HandleMap<T> {
    /// Returns a clone of the value behind `handle`, or `None` once it has
    /// been removed. This realizes the handle-map bijection invariant: for
    /// every handle returned by `insert`, `get` returns the same logical
    /// value until `remove` is called.
    pub fn get(&self, handle: u32) -> Option<T> {
        if handle == INVALID_HANDLE {
            return None;
        }
        let inner = self.inner.lock().expect("handle map poisoned");
        inner.slots.get((handle - 1) as usize).and_then(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bijection_until_removed() {
        let map: HandleMap<Arc<str>> = HandleMap::new();
        let p: Arc<str> = Arc::from("hello");
        let h = map.insert(p.clone());
        assert_ne!(h, INVALID_HANDLE);
        assert_eq!(map.get(h).unwrap().as_ref(), "hello");
        let removed = map.remove(h).unwrap();
        assert_eq!(removed.as_ref(), "hello");
        assert!(map.get(h).is_none());
    }

    #[test]
    fn invalid_handle_never_resolves() {
        let map: HandleMap<u32> = HandleMap::new();
        assert!(map.get(INVALID_HANDLE).is_none());
    }

    #[test]
    fn freed_slots_are_recycled() {
        let map: HandleMap<u32> = HandleMap::new();
        let h1 = map.insert(1);
        map.remove(h1);
        let h2 = map.insert(2);
        assert_eq!(h1, h2);
        assert_eq!(map.get(h2), Some(2));
    }
}
