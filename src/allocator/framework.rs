//! Host framework allocator table.
//!
//! The tensor framework looks up one allocator per device type. A new
//! allocator takes the slot when its priority is at least the current one.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::caching::DataPtr;
use super::error::AllocError;
use crate::device::DeviceType;

/// Priority the stream-ordering proxy is installed with.
pub const PROXY_PRIORITY: u8 = 255;

/// Allocator interface the framework calls into.
pub trait FrameworkAllocator: Send + Sync {
    fn allocate(&self, size: usize) -> Result<DataPtr, AllocError>;
}

struct Installed {
    allocator: Arc<dyn FrameworkAllocator>,
    priority: u8,
}

#[derive(Default)]
pub struct FrameworkAllocatorTable {
    entries: Mutex<HashMap<DeviceType, Installed>>,
}

impl FrameworkAllocatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static FrameworkAllocatorTable {
        static GLOBAL: OnceLock<FrameworkAllocatorTable> = OnceLock::new();
        GLOBAL.get_or_init(FrameworkAllocatorTable::new)
    }

    /// Install `allocator` for `device_type`; returns false if a higher
    /// priority allocator keeps the slot.
    pub fn set_allocator(
        &self,
        device_type: DeviceType,
        allocator: Arc<dyn FrameworkAllocator>,
        priority: u8,
    ) -> bool {
        let mut entries = self.entries.lock();
        if let Some(current) = entries.get(&device_type) {
            if priority < current.priority {
                return false;
            }
        }
        entries.insert(device_type, Installed { allocator, priority });
        true
    }

    pub fn get_allocator(&self, device_type: DeviceType) -> Option<Arc<dyn FrameworkAllocator>> {
        self.entries.lock().get(&device_type).map(|i| i.allocator.clone())
    }

    pub fn priority(&self, device_type: DeviceType) -> Option<u8> {
        self.entries.lock().get(&device_type).map(|i| i.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing(usize);

    impl FrameworkAllocator for Failing {
        fn allocate(&self, size: usize) -> Result<DataPtr, AllocError> {
            Err(AllocError::OutOfMemory { requested: size + self.0, reserved: 0, allocated: 0 })
        }
    }

    fn tag(table: &FrameworkAllocatorTable, device_type: DeviceType) -> usize {
        match table.get_allocator(device_type).unwrap().allocate(0) {
            Err(AllocError::OutOfMemory { requested, .. }) => requested,
            _ => usize::MAX,
        }
    }

    #[test]
    fn equal_or_higher_priority_replaces() {
        let table = FrameworkAllocatorTable::new();
        assert!(table.set_allocator(DeviceType::Cuda, Arc::new(Failing(1)), 10));
        assert!(table.set_allocator(DeviceType::Cuda, Arc::new(Failing(2)), 10));
        assert_eq!(tag(&table, DeviceType::Cuda), 2);
        assert!(table.set_allocator(DeviceType::Cuda, Arc::new(Failing(3)), PROXY_PRIORITY));
        assert_eq!(tag(&table, DeviceType::Cuda), 3);
    }

    #[test]
    fn lower_priority_is_rejected() {
        let table = FrameworkAllocatorTable::new();
        table.set_allocator(DeviceType::Accelerator, Arc::new(Failing(1)), PROXY_PRIORITY);
        assert!(!table.set_allocator(DeviceType::Accelerator, Arc::new(Failing(2)), 0));
        assert_eq!(tag(&table, DeviceType::Accelerator), 1);
        assert_eq!(table.priority(DeviceType::Accelerator), Some(PROXY_PRIORITY));
        assert!(table.get_allocator(DeviceType::Cpu).is_none());
    }
}
