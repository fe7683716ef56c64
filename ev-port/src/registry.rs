use std::sync::Arc;

use crate::event::Handler;
use crate::interest::Interest;
use crate::sys::RawFdLike;

pub(crate) struct Registration {
    pub(crate) fd: RawFdLike,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) interest: Interest,
    pub(crate) close_fd: bool,
    pub(crate) closing: bool,
}

/// Slot arena mirroring `rt_support::HandleMap`'s recycle-on-remove shape,
/// kept local because the dispatch loop needs direct mutable access to a
/// slot's fields (`closing`) rather than `HandleMap::get`'s cloned snapshot.
#[derive(Default)]
pub(crate) struct Registry {
    slots: Vec<Option<Registration>>,
    free: Vec<u32>,
}

impl Registry {
    pub(crate) fn insert(&mut self, reg: Registration) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(reg);
            index
        } else {
            self.slots.push(Some(reg));
            (self.slots.len() - 1) as u32
        }
    }

    pub(crate) fn get(&self, handle: u32) -> Option<&Registration> {
        self.slots.get(handle as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: u32) -> Option<&mut Registration> {
        self.slots.get_mut(handle as usize)?.as_mut()
    }

    pub(crate) fn remove(&mut self, handle: u32) -> Option<Registration> {
        let slot = self.slots.get_mut(handle as usize)?.take()?;
        self.free.push(handle);
        Some(slot)
    }
}
