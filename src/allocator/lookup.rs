//! Per-device allocator slots and the set of device-backed allocators.
//!
//! Slot `i < device_count` holds the allocator of device `i`; the trailing
//! slot holds the host allocator. A slot is filled at most once and never
//! replaced.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::caching::CachingAllocator;
use super::error::AllocError;

type Slot = RwLock<Option<Arc<dyn CachingAllocator>>>;

/// Fixed-size table of lazily created allocators.
pub struct AllocatorTable {
    slots: Vec<Slot>,
}

impl AllocatorTable {
    pub fn new(device_count: usize) -> Self {
        Self { slots: (0..=device_count).map(|_| RwLock::new(None)).collect() }
    }

    /// Index of the trailing host slot.
    pub fn host_index(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Allocator already stored in `index`, if any.
    pub fn get(&self, index: usize) -> Option<Arc<dyn CachingAllocator>> {
        self.slots.get(index).and_then(|slot| slot.read().clone())
    }

    /// Return the allocator in `index`, running `init` if the slot is empty.
    ///
    /// Racing callers on an empty slot construct exactly once; the losers get
    /// the winner's instance. A failed `init` leaves the slot empty.
    pub fn get_or_try_init<F>(&self, index: usize, init: F) -> Result<Arc<dyn CachingAllocator>, AllocError>
    where
        F: FnOnce() -> Result<Arc<dyn CachingAllocator>, AllocError>,
    {
        let slot = self.slots.get(index).ok_or(AllocError::InvalidDevice {
            index,
            count: self.host_index(),
        })?;
        if let Some(allocator) = slot.read().as_ref() {
            return Ok(allocator.clone());
        }
        let mut guard = slot.write();
        if let Some(allocator) = guard.as_ref() {
            return Ok(allocator.clone());
        }
        let allocator = init()?;
        *guard = Some(allocator.clone());
        Ok(allocator)
    }
}

/// Identity set of allocators backing device-class memory.
#[derive(Default)]
pub struct UsedAllocatorSet {
    allocators: Mutex<Vec<Arc<dyn CachingAllocator>>>,
}

impl UsedAllocatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `allocator`; returns false if that instance is already present.
    pub fn insert(&self, allocator: Arc<dyn CachingAllocator>) -> bool {
        let mut allocators = self.allocators.lock();
        if allocators.iter().any(|a| Arc::ptr_eq(a, &allocator)) {
            return false;
        }
        allocators.push(allocator);
        true
    }

    pub fn contains(&self, allocator: &Arc<dyn CachingAllocator>) -> bool {
        self.allocators.lock().iter().any(|a| Arc::ptr_eq(a, allocator))
    }

    /// Copy of the current members, taken under the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn CachingAllocator>> {
        self.allocators.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.allocators.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::best_fit::BestFitAllocator;
    use crate::allocator::caching::AllocatorTarget;
    use crate::device::{DeviceClass, SimRuntime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make() -> Arc<dyn CachingAllocator> {
        let target = AllocatorTarget {
            class: DeviceClass::Device,
            device_index: 0,
            runtime: Arc::new(SimRuntime::default()),
        };
        Arc::new(BestFitAllocator::new(&target))
    }

    #[test]
    fn table_has_trailing_host_slot() {
        let table = AllocatorTable::new(4);
        assert_eq!(table.len(), 5);
        assert_eq!(table.host_index(), 4);
        assert!(table.get(4).is_none());
    }

    #[test]
    fn slot_is_memoized() {
        let table = AllocatorTable::new(1);
        let a = table.get_or_try_init(0, || Ok(make())).unwrap();
        let b = table.get_or_try_init(0, || panic!("slot must not be rebuilt")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn failed_init_leaves_slot_empty() {
        let table = AllocatorTable::new(1);
        let err = table.get_or_try_init(0, || Err(AllocError::RuntimeAlreadyInstalled));
        assert!(err.is_err());
        assert!(table.get(0).is_none());
        assert!(table.get_or_try_init(0, || Ok(make())).is_ok());
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let table = AllocatorTable::new(2);
        let err = table.get_or_try_init(3, || Ok(make())).err().unwrap();
        assert!(matches!(err, AllocError::InvalidDevice { index: 3, count: 2 }));
    }

    #[test]
    fn racing_first_access_constructs_once() {
        let table = Arc::new(AllocatorTable::new(1));
        let builds = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let builds = builds.clone();
                std::thread::spawn(move || {
                    table
                        .get_or_try_init(0, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok(make())
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn used_set_deduplicates_by_identity() {
        let set = UsedAllocatorSet::new();
        let a = make();
        let b = make();
        assert!(set.insert(a.clone()));
        assert!(!set.insert(a.clone()));
        assert!(set.insert(b));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
    }
}
