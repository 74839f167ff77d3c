// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Caching allocator capability and allocation handles.
//!
//! Every pluggable algorithm implements [`CachingAllocator`]. Callers receive
//! a [`DataPtr`], which frees its block back to the owning allocator on drop.
//!
//! # Recorded streams
//!
//! An allocation is implicitly ordered on the stream that allocated it. Any
//! consumer that hands the pointer to another stream must call
//! [`DataPtr::record_stream`] for that stream before the allocation is freed.
//! Otherwise the block may be reused while the other stream still touches it.
//! The allocator cannot detect a missing record.
//!
//! A block freed from a side stream is not reused, by any stream, until the
//! work queued on that side stream at free time has retired.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::AllocError;
use super::stats::MemoryStats;
use crate::device::{DeviceClass, DevicePtr, DeviceRuntime, MemoryLocation, Stream};

/// What a constructor needs to build an allocator for one lookup slot.
#[derive(Clone)]
pub struct AllocatorTarget {
    pub class: DeviceClass,
    /// Physical device index (0 for host allocators).
    pub device_index: usize,
    pub runtime: Arc<dyn DeviceRuntime>,
}

impl AllocatorTarget {
    pub fn location(&self) -> MemoryLocation {
        match self.class {
            DeviceClass::Device => MemoryLocation::Device(self.device_index),
            DeviceClass::Host => MemoryLocation::Host,
        }
    }
}

impl fmt::Debug for AllocatorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorTarget")
            .field("class", &self.class)
            .field("device_index", &self.device_index)
            .finish()
    }
}

/// Stream an allocation at `location` is ordered on.
pub fn allocating_stream(runtime: &dyn DeviceRuntime, location: MemoryLocation) -> Stream {
    match location {
        MemoryLocation::Device(index) => runtime.current_stream(index),
        MemoryLocation::Host => runtime.current_stream(runtime.current_device()),
    }
}

/// A block handed to a caller.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub id: u64,
    pub ptr: DevicePtr,
    /// Block size actually held, may exceed the requested size.
    pub size: usize,
    pub requested: usize,
    pub location: MemoryLocation,
    /// Stream that performed the allocation.
    pub stream: Stream,
    recorded: Arc<Mutex<HashSet<Stream>>>,
}

impl Allocation {
    pub fn new(
        id: u64,
        ptr: DevicePtr,
        size: usize,
        requested: usize,
        location: MemoryLocation,
        stream: Stream,
    ) -> Self {
        Self {
            id,
            ptr,
            size,
            requested,
            location,
            stream,
            recorded: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mark `stream` as a possible user of this block. Recording the
    /// allocating stream, or recording twice, changes nothing.
    pub fn record_stream(&self, stream: Stream) {
        if stream != self.stream {
            self.recorded.lock().insert(stream);
        }
    }

    /// Streams other than the allocating one that may still use the block.
    pub fn recorded_streams(&self) -> Vec<Stream> {
        let mut streams: Vec<Stream> = self.recorded.lock().iter().copied().collect();
        streams.sort();
        streams
    }
}

/// Contract every pluggable caching algorithm satisfies.
///
/// Implementations own their pools behind their own lock. `free` never
/// blocks on device completion: blocks with recorded streams are parked
/// and re-checked on later calls.
pub trait CachingAllocator: Send + Sync {
    /// Registered algorithm name.
    fn name(&self) -> &str;

    fn class(&self) -> DeviceClass;

    fn location(&self) -> MemoryLocation;

    fn allocate(&self, size: usize) -> Result<Allocation, AllocError>;

    fn free(&self, allocation: &Allocation) -> Result<(), AllocError>;

    /// Return cached, unused blocks to the device.
    fn empty_cache(&self) -> Result<(), AllocError>;

    /// Return every block to the device, including ones still handed out.
    ///
    /// Callers must guarantee nothing references any block and no device
    /// work using them is in flight.
    fn release_all_memory(&self) -> Result<(), AllocError>;

    fn stats(&self) -> MemoryStats;

    fn memory_reserved(&self) -> usize {
        self.stats().reserved
    }

    fn memory_allocated(&self) -> usize {
        self.stats().allocated
    }

    fn max_memory_reserved(&self) -> usize {
        self.stats().max_reserved
    }

    fn max_memory_allocated(&self) -> usize {
        self.stats().max_allocated
    }
}

/// Owning handle to an allocation; frees it on drop.
pub struct DataPtr {
    allocation: Allocation,
    allocator: Arc<dyn CachingAllocator>,
    freed: bool,
}

impl DataPtr {
    pub fn new(allocation: Allocation, allocator: Arc<dyn CachingAllocator>) -> Self {
        Self { allocation, allocator, freed: false }
    }

    pub fn ptr(&self) -> DevicePtr {
        self.allocation.ptr
    }

    pub fn size(&self) -> usize {
        self.allocation.requested
    }

    pub fn location(&self) -> MemoryLocation {
        self.allocation.location
    }

    pub fn stream(&self) -> Stream {
        self.allocation.stream
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    pub fn allocator(&self) -> &Arc<dyn CachingAllocator> {
        &self.allocator
    }

    /// See the module docs for when this is required.
    pub fn record_stream(&self, stream: Stream) {
        self.allocation.record_stream(stream);
    }

    /// Free now and report failures, instead of logging them on drop.
    pub fn free(mut self) -> Result<(), AllocError> {
        self.freed = true;
        self.allocator.free(&self.allocation)
    }
}

impl fmt::Debug for DataPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPtr")
            .field("allocation", &self.allocation)
            .field("allocator", &self.allocator.name())
            .finish()
    }
}

impl Drop for DataPtr {
    fn drop(&mut self) {
        if self.freed {
            return;
        }
        if let Err(e) = self.allocator.free(&self.allocation) {
            tracing::debug!(id = self.allocation.id, error = %e, "free on drop failed");
        }
    }
}
