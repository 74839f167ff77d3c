//! Global cache controller.
//!
//! Sweeps cover device-class allocators only. Sweep order is unspecified and
//! a failing allocator never stops the others from being visited.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::caching::CachingAllocator;
use super::context::AllocatorContext;
use super::error::AllocError;
use super::lookup::UsedAllocatorSet;
use crate::device::Device;
use crate::telemetry;

/// Apply `op` to every used allocator, isolating errors and panics.
/// Returns how many allocators failed.
fn sweep<F>(used: &UsedAllocatorSet, operation: &'static str, op: F) -> usize
where
    F: Fn(&dyn CachingAllocator) -> Result<(), AllocError>,
{
    let mut failed = 0;
    for allocator in used.snapshot() {
        let outcome = catch_unwind(AssertUnwindSafe(|| op(&*allocator)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                tracing::warn!(operation, location = %allocator.location(), error = %e, "allocator sweep step failed");
            }
            Err(_) => {
                failed += 1;
                tracing::warn!(operation, location = %allocator.location(), "allocator panicked during sweep");
            }
        }
        telemetry::record_allocator_stats(&allocator.location().to_string(), &allocator.stats());
    }
    tracing::debug!(operation, visited = used.len(), failed, "allocator sweep finished");
    failed
}

/// Trim the free cache of every used device allocator.
pub(crate) fn empty_cached_mem(used: &UsedAllocatorSet) {
    sweep(used, "empty_cache", |a| a.empty_cache());
}

/// Return all memory of every used device allocator to the device.
///
/// Only safe when no device memory is referenced and no work is in flight.
pub(crate) fn release_all_device_mem(used: &UsedAllocatorSet) {
    sweep(used, "release_all_memory", |a| a.release_all_memory());
}

impl AllocatorContext {
    pub fn empty_cached_mem(&self) {
        empty_cached_mem(self.used_allocators());
    }

    pub fn release_all_device_mem(&self) {
        release_all_device_mem(self.used_allocators());
    }

    fn query(&self, device: Device) -> Result<Arc<dyn CachingAllocator>, AllocError> {
        self.get_allocator(device)
    }

    /// Bytes held from the device by `device`'s allocator.
    pub fn memory_reserved(&self, device: Device) -> Result<usize, AllocError> {
        Ok(self.query(device)?.memory_reserved())
    }

    /// Bytes handed to callers by `device`'s allocator.
    pub fn memory_allocated(&self, device: Device) -> Result<usize, AllocError> {
        Ok(self.query(device)?.memory_allocated())
    }

    pub fn max_memory_reserved(&self, device: Device) -> Result<usize, AllocError> {
        Ok(self.query(device)?.max_memory_reserved())
    }

    pub fn max_memory_allocated(&self, device: Device) -> Result<usize, AllocError> {
        Ok(self.query(device)?.max_memory_allocated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::best_fit::BestFitAllocator;
    use crate::allocator::caching::{Allocation, AllocatorTarget};
    use crate::allocator::stats::MemoryStats;
    use crate::device::{DeviceClass, MemoryLocation, SimRuntime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Broken {
        calls: AtomicUsize,
        panics: bool,
    }

    impl CachingAllocator for Broken {
        fn name(&self) -> &str {
            "BROKEN"
        }
        fn class(&self) -> DeviceClass {
            DeviceClass::Device
        }
        fn location(&self) -> MemoryLocation {
            MemoryLocation::Device(0)
        }
        fn allocate(&self, size: usize) -> Result<Allocation, AllocError> {
            Err(AllocError::OutOfMemory { requested: size, reserved: 0, allocated: 0 })
        }
        fn free(&self, allocation: &Allocation) -> Result<(), AllocError> {
            Err(AllocError::UnknownAllocation(allocation.id))
        }
        fn empty_cache(&self) -> Result<(), AllocError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("trim exploded");
            }
            Err(AllocError::UnknownAllocation(0))
        }
        fn release_all_memory(&self) -> Result<(), AllocError> {
            self.empty_cache()
        }
        fn stats(&self) -> MemoryStats {
            MemoryStats::default()
        }
    }

    fn healthy(rt: &Arc<SimRuntime>) -> Arc<BestFitAllocator> {
        let target = AllocatorTarget { class: DeviceClass::Device, device_index: 0, runtime: rt.clone() };
        Arc::new(BestFitAllocator::new(&target))
    }

    #[test]
    fn failing_allocators_do_not_stop_the_sweep() {
        let rt = Arc::new(SimRuntime::default());
        let used = UsedAllocatorSet::new();
        let erroring = Arc::new(Broken { calls: AtomicUsize::new(0), panics: false });
        let panicking = Arc::new(Broken { calls: AtomicUsize::new(0), panics: true });
        let good = healthy(&rt);
        let a = good.allocate(4096).unwrap();
        good.free(&a).unwrap();

        used.insert(erroring.clone());
        used.insert(panicking.clone());
        used.insert(good.clone());

        assert_eq!(sweep(&used, "empty_cache", |a| a.empty_cache()), 2);
        assert_eq!(erroring.calls.load(Ordering::SeqCst), 1);
        assert_eq!(panicking.calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.memory_reserved(), 0);
    }

    #[test]
    fn release_all_sweep_visits_every_allocator() {
        let rt = Arc::new(SimRuntime::default());
        let used = UsedAllocatorSet::new();
        let first = healthy(&rt);
        let second = healthy(&rt);
        let _live = first.allocate(1024).unwrap();
        let _other = second.allocate(2048).unwrap();
        used.insert(first.clone());
        used.insert(second.clone());

        release_all_device_mem(&used);
        assert_eq!(first.stats().reserved, 0);
        assert_eq!(second.stats().allocated, 0);
        assert_eq!(rt.reserved_bytes(MemoryLocation::Device(0)), 0);
    }
}
