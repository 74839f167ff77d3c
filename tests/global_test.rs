//! Process-wide allocator entry points.
//!
//! All tests share one process, so they install the same runtime and only
//! assert on state they create themselves.

use std::sync::{Arc, Once};

use devcache_core::allocator::{
    self, AllocError, CachingAllocator, FrameworkAllocatorTable, PROXY_PRIORITY,
};
use devcache_core::device::{Device, DeviceRuntime, DeviceType, SimRuntime};

static SETUP: Once = Once::new();

fn setup() {
    SETUP.call_once(|| {
        allocator::install_runtime(Arc::new(SimRuntime::with_devices(2, 1 << 28))).unwrap();
        allocator::init_cached_allocator();
    });
}

#[test]
fn runtime_cannot_be_replaced_after_install() {
    setup();
    let err = allocator::install_runtime(Arc::new(SimRuntime::default())).unwrap_err();
    assert!(matches!(err, AllocError::RuntimeAlreadyInstalled));
    assert_eq!(allocator::runtime().device_count(), 2);
}

#[test]
fn proxy_is_installed_for_accelerator_and_cuda() {
    setup();
    let table = FrameworkAllocatorTable::global();
    assert_eq!(table.priority(DeviceType::Accelerator), Some(PROXY_PRIORITY));
    assert_eq!(table.priority(DeviceType::Cuda), Some(PROXY_PRIORITY));

    allocator::init_cached_allocator();
    let cuda = table.get_allocator(DeviceType::Cuda).unwrap();
    let ptr = cuda.allocate(2048).unwrap();
    assert_eq!(ptr.size(), 2048);
    assert_eq!(ptr.allocator().name(), "BF");
}

#[test]
fn lookup_returns_the_same_instance() {
    setup();
    let a = allocator::get_allocator(Device::accelerator(1)).unwrap();
    let b = allocator::get_allocator(Device::accelerator(1)).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let current = allocator::get_allocator_for_type(DeviceType::Accelerator).unwrap();
    let zero = allocator::get_allocator(Device::accelerator(0)).unwrap();
    assert!(Arc::ptr_eq(&current, &zero));

    let host = allocator::get_allocator(Device::cpu()).unwrap();
    assert!(!Arc::ptr_eq(&host, &zero));
}

#[test]
fn out_of_range_device_is_rejected() {
    setup();
    let err = allocator::get_allocator(Device::accelerator(7)).err().unwrap();
    assert!(matches!(err, AllocError::InvalidDevice { index: 7, count: 2 }));
    assert!(allocator::memory_reserved(Device::accelerator(7)).is_err());
}

#[test]
fn stats_queries_reach_the_device_allocator() {
    setup();
    let device = Device::accelerator(1);
    let direct = allocator::get_allocator(device).unwrap();
    let ptr = allocator::DataPtr::new(direct.allocate(1 << 20).unwrap(), direct.clone());
    allocator::record_stream(&ptr, devcache_core::device::Stream::default_for(1));

    assert!(allocator::memory_allocated(device).unwrap() >= 1 << 20);
    assert!(allocator::max_memory_allocated(device).unwrap() >= 1 << 20);
    assert!(allocator::memory_reserved(device).unwrap() >= allocator::memory_allocated(device).unwrap());
    assert!(allocator::max_memory_reserved(device).unwrap() >= 1 << 20);
    drop(ptr);
    allocator::empty_cached_mem();
}
