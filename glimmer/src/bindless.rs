use std::mem;
use std::ops::Range;

use crate::{gpu, Error, ResourceKind, Result};

/// Host-side mirror of a bindless heap: maps handles to resources and hands
/// out contiguous ranges of slots.
#[derive(Clone, Debug)]
pub struct BindlessTable<R> {
    kind: ResourceKind,
    slots: Vec<Option<R>>,
    allocator: SlotAllocator,
}

impl<R> BindlessTable<R> {
    pub fn new(kind: ResourceKind, capacity: u32) -> Self {
        Self {
            kind,
            slots: Default::default(),
            allocator: SlotAllocator::new(capacity),
        }
    }

    pub fn register(&mut self, resource: R) -> Result<gpu::Handle> {
        self.register_many(Some(resource))
    }

    /// Registers resources under consecutive handles, returning handle of
    /// the first one (or [`gpu::Handle::INVALID`] if there was nothing to
    /// register).
    pub fn register_many<I>(&mut self, resources: I) -> Result<gpu::Handle>
    where
        I: IntoIterator<Item = R>,
        I::IntoIter: ExactSizeIterator,
    {
        let resources = resources.into_iter();
        let len = resources.len();

        if len == 0 {
            return Ok(gpu::Handle::INVALID);
        }

        let range =
            self.allocator
                .take(len as u32)
                .ok_or(Error::BindlessHeapFull {
                    kind: self.kind,
                    requested: len,
                })?;

        if self.slots.len() < range.end as usize {
            self.slots.resize_with(range.end as usize, || None);
        }

        for (slot, resource) in range.clone().zip(resources) {
            self.slots[slot as usize] = Some(resource);
        }

        Ok(gpu::Handle::new(range.start))
    }

    pub fn resolve(&self, handle: gpu::Handle) -> Option<&R> {
        self.slots.get(handle.get() as usize)?.as_ref()
    }

    /// Releases `count` slots starting at `first`; returns the resources
    /// that were registered there.
    pub fn unregister(&mut self, first: gpu::Handle, count: u32) -> Vec<R> {
        if !first.is_valid() || count == 0 {
            return Default::default();
        }

        let range = first.get()..(first.get() + count);

        let resources = range
            .clone()
            .filter_map(|slot| self.slots.get_mut(slot as usize)?.take())
            .collect();

        while let Some(None) = self.slots.last() {
            self.slots.pop();
        }

        self.allocator.give(range);

        resources
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the number of slots up to (and including) the last occupied
    /// one.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&R>> + '_ {
        self.slots.iter().map(Option::as_ref)
    }
}

/// First-fit allocator of slot ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SlotAllocator {
    free: Vec<Range<u32>>,
    dirty: bool,
}

impl SlotAllocator {
    fn new(capacity: u32) -> Self {
        let mut this = Self::default();

        if capacity > 0 {
            this.give(0..capacity);
        }

        this
    }

    fn give(&mut self, range: Range<u32>) {
        if let Some(last) = self.free.last() {
            self.dirty |= range.start <= last.end;
        }

        self.free.push(range);
    }

    fn take(&mut self, len: u32) -> Option<Range<u32>> {
        assert!(len > 0);

        self.compact();

        let idx = self
            .free
            .iter()
            .position(|range| range.len() >= len as usize)?;
        let range = &mut self.free[idx];

        if range.len() > len as usize {
            range.start += len;

            Some((range.start - len)..range.start)
        } else {
            Some(self.free.remove(idx))
        }
    }

    fn compact(&mut self) {
        if !mem::take(&mut self.dirty) || self.free.is_empty() {
            return;
        }

        self.free.sort_by_key(|range| range.start);

        let mut idx = 0;

        while idx < (self.free.len() - 1) {
            if self.free[idx].end == self.free[idx + 1].start {
                self.free[idx].end = self.free.remove(idx + 1).end;
            } else {
                idx += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator() {
        let mut target = SlotAllocator::default();

        assert_eq!(None, target.take(16));

        // ---
        // Case 1: Just one range

        target.give(0..32);

        assert_eq!(Some(0..8), target.take(8));
        assert_eq!(Some(8..16), target.take(8));
        assert_eq!(Some(16..24), target.take(8));
        assert_eq!(Some(24..32), target.take(8));
        assert_eq!(None, target.take(8));

        // ---
        // Case 2: Many ranges

        target.give(0..8);
        target.give(10..15);

        assert_eq!(Some(0..4), target.take(4));
        assert_eq!(Some(4..8), target.take(4));
        assert_eq!(Some(10..14), target.take(4));
        assert_eq!(None, target.take(4));
        assert_eq!(Some(14..15), target.take(1));
        assert_eq!(None, target.take(1));

        // ---
        // Case 3: Compaction of ranges given back out of order

        target.give(24..32);
        target.give(16..24);
        target.give(8..16);
        target.give(0..8);

        assert_eq!(Some(0..20), target.take(20));
        assert_eq!(Some(20..32), target.take(12));
        assert_eq!(None, target.take(1));
    }

    #[test]
    fn consecutive_handles() {
        let mut target = BindlessTable::new(ResourceKind::Buffer, 16);

        assert_eq!(gpu::Handle::new(0), target.register("a").unwrap());

        assert_eq!(
            gpu::Handle::new(1),
            target.register_many(["b", "c", "d"]).unwrap()
        );

        assert_eq!(Some(&"a"), target.resolve(gpu::Handle::new(0)));
        assert_eq!(Some(&"c"), target.resolve(gpu::Handle::new(2)));
        assert_eq!(None, target.resolve(gpu::Handle::new(4)));
        assert_eq!(None, target.resolve(gpu::Handle::INVALID));
        assert_eq!(4, target.len());
    }

    #[test]
    fn nothing_to_register() {
        let mut target = BindlessTable::<u32>::new(ResourceKind::Buffer, 16);

        assert_eq!(
            gpu::Handle::INVALID,
            target.register_many(Vec::new()).unwrap()
        );

        assert!(target.is_empty());
    }

    #[test]
    fn unregistered_slots_get_reused() {
        let mut target = BindlessTable::new(ResourceKind::SampledImage, 8);

        let first = target.register_many([1, 2, 3, 4]).unwrap();
        let second = target.register_many([5, 6]).unwrap();

        assert_eq!(gpu::Handle::new(4), second);
        assert_eq!(vec![1, 2, 3, 4], target.unregister(first, 4));
        assert_eq!(None, target.resolve(first));

        assert_eq!(first, target.register_many([7, 8, 9]).unwrap());
        assert_eq!(Some(&5), target.resolve(second));
    }

    #[test]
    fn running_out_of_slots() {
        let mut target = BindlessTable::new(ResourceKind::StorageImage, 4);

        target.register_many([1, 2, 3]).unwrap();

        assert!(matches!(
            target.register_many([4, 5]),
            Err(Error::BindlessHeapFull {
                kind: ResourceKind::StorageImage,
                requested: 2,
            })
        ));

        assert!(target.register(4).is_ok());
    }
}
