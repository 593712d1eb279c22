//! The async/sync dual-list discipline shared by every managed GPU
//! resource kind (shaders, raster configs, texture sets, uniform sets).
//!
//! `list_async` is the only copy the update thread ever touches; `Sync`
//! materialises it into `list_sync`, the only copy the render thread ever
//! touches. Between `Sync` calls the render thread sees a stable snapshot
//! even while the update thread is already mutating `list_async` for the
//! next frame.

use crate::recycle_list::{RecycleIndexList, SlotId};

pub struct DualResourceList<T: Clone> {
    list_async: RecycleIndexList<T>,
    list_add: Vec<SlotId>,
    list_rem: Vec<SlotId>,
    list_sync: Vec<T>,
    sentinel: T,
}

impl<T: Clone> DualResourceList<T> {
    pub fn new(sentinel: T) -> Self {
        Self {
            list_async: RecycleIndexList::with_sentinel(sentinel.clone()),
            list_add: Vec::new(),
            list_rem: Vec::new(),
            list_sync: vec![sentinel.clone()],
            sentinel,
        }
    }

    /// Reserves a slot in `list_async`, appends to `list_add`. The value
    /// becomes visible on the render thread only after the next `sync`.
    pub fn register(&mut self, value: T) -> SlotId {
        let id = self.list_async.add(value);
        self.list_add.push(id);
        id
    }

    /// Appends to `list_rem`. The render thread still sees the old value
    /// until the next `sync`.
    pub fn remove(&mut self, id: SlotId) {
        self.list_async.remove(id);
        self.list_rem.push(id);
    }

    pub fn get_async(&self, id: SlotId) -> Option<&T> {
        self.list_async.get(id)
    }

    pub fn get_async_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.list_async.get_mut(id)
    }

    /// Render-thread read. Falls back to the sentinel for an id past the
    /// end of `list_sync` (never happens in practice since `sync` always
    /// grows to cover every async slot).
    pub fn get_sync(&self, id: SlotId) -> &T {
        self.list_sync.get(id as usize).unwrap_or(&self.sentinel)
    }

    pub fn iter_sync(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.list_sync.iter().enumerate().map(|(i, v)| (i as u32, v))
    }

    /// The dense render-thread-side snapshot, indexed by slot id. Used to
    /// hand a contiguous slice to a draw stage without per-id lookups.
    pub fn as_slice_sync(&self) -> &[T] {
        &self.list_sync
    }

    pub fn occupied_ids(&self) -> Vec<SlotId> {
        self.list_async.iter().map(|(id, _)| id).collect()
    }

    pub fn capacity_len(&self) -> usize {
        self.list_async.capacity_len()
    }

    /// Applies pending removals (invoking `on_remove` with the still-live
    /// render-side value first, for GL cleanup), resizes `list_sync` to
    /// the current async capacity, then applies pending additions
    /// (invoking `on_add`, for GL init).
    pub fn sync(&mut self, mut on_remove: impl FnMut(&T), mut on_add: impl FnMut(&T)) {
        for id in self.list_rem.drain(..) {
            if let Some(value) = self.list_sync.get(id as usize) {
                on_remove(value);
            }
        }

        let target_len = self.list_async.capacity_len();
        if self.list_sync.len() < target_len {
            self.list_sync.resize(target_len, self.sentinel.clone());
        }

        for id in self.list_add.drain(..) {
            if let Some(value) = self.list_async.get(id) {
                self.list_sync[id as usize] = value.clone();
                on_add(value);
            }
        }
    }

    pub fn reset(&mut self) {
        self.list_async = RecycleIndexList::with_sentinel(self.sentinel.clone());
        self.list_add.clear();
        self.list_rem.clear();
        self.list_sync = vec![self.sentinel.clone()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_reveals_additions_and_runs_callbacks_in_order() {
        let mut list: DualResourceList<i32> = DualResourceList::new(0);
        let id = list.register(7);
        assert_eq!(*list.get_sync(id), 0, "not visible to the render thread before sync");

        let mut added = Vec::new();
        list.sync(|_| panic!("nothing removed yet"), |v| added.push(*v));
        assert_eq!(*list.get_sync(id), 7);
        assert_eq!(added, vec![7]);
    }

    #[test]
    fn sync_runs_on_remove_before_growing_list_sync() {
        let mut list: DualResourceList<i32> = DualResourceList::new(-1);
        let id = list.register(7);
        list.sync(|_| {}, |_| {});
        list.remove(id);

        let mut removed = Vec::new();
        list.sync(|v| removed.push(*v), |_| {});
        assert_eq!(removed, vec![7]);
    }
}
