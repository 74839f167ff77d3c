//! Stream-aware caching allocator layer.
//!
//! Pluggable algorithms are registered by name per device class, created
//! lazily per device, and reached through a proxy that orders off-default
//! stream allocations after the default stream.

pub mod best_fit;
mod caching;
mod context;
mod controller;
mod error;
mod framework;
mod global;
mod lookup;
mod proxy;
pub mod raw;
mod reclaim;
mod registry;
mod stats;

pub use best_fit::{BestFitAllocator, BestFitConfig, OomPolicy};
pub use caching::{allocating_stream, Allocation, AllocatorTarget, CachingAllocator, DataPtr};
pub use context::{AllocatorContext, HOST_DEVICE_INDEX};
pub use error::AllocError;
pub use framework::{FrameworkAllocator, FrameworkAllocatorTable, PROXY_PRIORITY};
pub use global::{
    context, default_device_allocator, empty_cached_mem, get_allocator, get_allocator_for_type,
    init_cached_allocator, install_runtime, max_memory_allocated, max_memory_reserved,
    memory_allocated, memory_reserved, record_stream, release_all_device_mem, runtime,
};
pub use lookup::{AllocatorTable, UsedAllocatorSet};
pub use proxy::DeviceCachingProxy;
pub use raw::RawAllocator;
pub use registry::{constructor, AlgorithmRegistry, AllocatorConstructor, Registration, BUILTIN_PRIORITY};
pub use stats::{MemoryStats, StatsCounters};
