//! Sweeps over every used device allocator.

use std::sync::Arc;

use devcache_core::allocator::{AlgorithmRegistry, AllocatorContext, DataPtr};
use devcache_core::config::AlgorithmSelection;
use devcache_core::device::{Device, MemoryLocation, SimRuntime};

const MIB: usize = 1024 * 1024;

fn setup() -> (Arc<SimRuntime>, AllocatorContext) {
    let rt = Arc::new(SimRuntime::with_devices(2, 64 * MIB));
    let ctx = AllocatorContext::new(
        rt.clone(),
        Arc::new(AlgorithmRegistry::with_builtins()),
        AlgorithmSelection::default(),
    );
    (rt, ctx)
}

fn alloc(ctx: &AllocatorContext, device: Device, size: usize) -> DataPtr {
    let allocator = ctx.get_allocator(device).unwrap();
    let allocation = allocator.allocate(size).unwrap();
    DataPtr::new(allocation, allocator)
}

#[test]
fn empty_cached_mem_returns_every_free_block() {
    let (rt, ctx) = setup();
    for index in 0..2 {
        drop(alloc(&ctx, Device::accelerator(index), MIB));
        drop(alloc(&ctx, Device::accelerator(index), 3 * MIB));
    }
    assert!(ctx.memory_reserved(Device::accelerator(0)).unwrap() > 0);

    ctx.empty_cached_mem();
    for index in 0..2 {
        assert_eq!(ctx.memory_reserved(Device::accelerator(index)).unwrap(), 0);
        assert_eq!(rt.reserved_bytes(MemoryLocation::Device(index)), 0);
        assert!(ctx.max_memory_reserved(Device::accelerator(index)).unwrap() >= 4 * MIB);
    }
}

#[test]
fn empty_cached_mem_keeps_live_blocks() {
    let (_rt, ctx) = setup();
    let live = alloc(&ctx, Device::accelerator(0), MIB);
    drop(alloc(&ctx, Device::accelerator(0), 4 * MIB));

    ctx.empty_cached_mem();
    assert_eq!(ctx.memory_reserved(Device::accelerator(0)).unwrap(), MIB);
    assert_eq!(ctx.memory_allocated(Device::accelerator(0)).unwrap(), MIB);
    drop(live);
}

#[test]
fn host_allocator_is_not_swept() {
    let (rt, ctx) = setup();
    drop(alloc(&ctx, Device::cpu(), 8192));
    drop(alloc(&ctx, Device::accelerator(0), 8192));
    assert_eq!(ctx.used_allocators().len(), 1);

    ctx.empty_cached_mem();
    assert_eq!(rt.reserved_bytes(MemoryLocation::Host), 8192);
    assert_eq!(rt.reserved_bytes(MemoryLocation::Device(0)), 0);
}

#[test]
fn release_all_device_mem_drops_live_and_cached() {
    let (rt, ctx) = setup();
    let live = alloc(&ctx, Device::accelerator(1), 2 * MIB);
    drop(alloc(&ctx, Device::accelerator(1), MIB));

    ctx.release_all_device_mem();
    assert_eq!(rt.reserved_bytes(MemoryLocation::Device(1)), 0);
    let stats = ctx.get_allocator(Device::accelerator(1)).unwrap().stats();
    assert_eq!(stats.allocated, 0);
    assert_eq!(stats.reserved, 0);
    assert_eq!(stats.max_allocated, 3 * MIB);
    // The handle is stale now; dropping it only logs.
    drop(live);
    assert_eq!(rt.reserved_bytes(MemoryLocation::Device(1)), 0);
}
