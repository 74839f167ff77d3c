//! Pass-through allocator (`RAW`).
//!
//! Reserves exactly what is asked and returns it to the device on free. The
//! only blocks it holds on to are ones whose streams have not retired and
//! ones the device refused to take back, which are retried on the next
//! `empty_cache` or `release_all_memory`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::caching::{allocating_stream, Allocation, AllocatorTarget, CachingAllocator};
use super::error::AllocError;
use super::reclaim::{destroy_events, record_free_events, PendingFrees};
use super::stats::{MemoryStats, StatsCounters};
use crate::device::{DeviceClass, DevicePtr, DeviceRuntime, MemoryLocation, RuntimeError};

/// Registered name of this algorithm.
pub const NAME: &str = "RAW";

#[derive(Debug, Clone, Copy)]
struct Block {
    ptr: DevicePtr,
    size: usize,
}

struct RawState {
    live: HashMap<u64, Block>,
    pending: PendingFrees<Block>,
    refused: Vec<Block>,
}

pub struct RawAllocator {
    class: DeviceClass,
    location: MemoryLocation,
    runtime: Arc<dyn DeviceRuntime>,
    next_id: AtomicU64,
    stats: StatsCounters,
    state: Mutex<RawState>,
}

impl RawAllocator {
    pub fn new(target: &AllocatorTarget) -> Self {
        Self {
            class: target.class,
            location: target.location(),
            runtime: target.runtime.clone(),
            next_id: AtomicU64::new(1),
            stats: StatsCounters::new(),
            state: Mutex::new(RawState {
                live: HashMap::new(),
                pending: PendingFrees::new(),
                refused: Vec::new(),
            }),
        }
    }

    /// Blocks the device refused to release, still counted as reserved.
    pub fn refused_blocks(&self) -> usize {
        self.state.lock().refused.len()
    }

    fn release_blocks(&self, s: &mut RawState, blocks: Vec<Block>) -> Result<(), AllocError> {
        let mut first_err: Option<RuntimeError> = None;
        for block in blocks {
            match self.runtime.release(self.location, block.ptr, block.size) {
                Ok(()) => self.stats.on_release(block.size),
                Err(e) => {
                    tracing::debug!(ptr = %block.ptr, size = block.size, error = %e, "release refused, kept for retry");
                    s.refused.push(block);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn release_ready(&self, s: &mut RawState) -> Result<(), AllocError> {
        let ready = s.pending.collect_ready(&*self.runtime);
        self.release_blocks(s, ready)
    }
}

impl CachingAllocator for RawAllocator {
    fn name(&self) -> &str {
        NAME
    }

    fn class(&self) -> DeviceClass {
        self.class
    }

    fn location(&self) -> MemoryLocation {
        self.location
    }

    fn allocate(&self, size: usize) -> Result<Allocation, AllocError> {
        let size_held = size.max(1);
        let stream = allocating_stream(&*self.runtime, self.location);
        let mut s = self.state.lock();
        if let Err(e) = self.release_ready(&mut s) {
            tracing::warn!(location = %self.location, error = %e, "parked block release failed");
        }
        let ptr = match self.runtime.reserve(self.location, size_held) {
            Ok(ptr) => ptr,
            Err(RuntimeError::OutOfMemory { .. }) => {
                let stats = self.stats.snapshot();
                return Err(AllocError::OutOfMemory {
                    requested: size_held,
                    reserved: stats.reserved,
                    allocated: stats.allocated,
                });
            }
            Err(e) => return Err(e.into()),
        };
        self.stats.on_reserve(size_held);
        self.stats.on_allocate(size_held);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        s.live.insert(id, Block { ptr, size: size_held });
        Ok(Allocation::new(id, ptr, size_held, size, self.location, stream))
    }

    fn free(&self, allocation: &Allocation) -> Result<(), AllocError> {
        let events = record_free_events(&*self.runtime, allocation)?;
        let mut s = self.state.lock();
        let Some(block) = s.live.remove(&allocation.id) else {
            drop(s);
            destroy_events(&*self.runtime, events);
            return Err(AllocError::UnknownAllocation(allocation.id));
        };
        self.stats.on_free(block.size);
        if events.is_empty() {
            self.release_blocks(&mut s, vec![block])
        } else {
            s.pending.push(block, events);
            Ok(())
        }
    }

    fn empty_cache(&self) -> Result<(), AllocError> {
        let mut s = self.state.lock();
        let mut blocks = std::mem::take(&mut s.refused);
        blocks.extend(s.pending.collect_ready(&*self.runtime));
        self.release_blocks(&mut s, blocks)
    }

    fn release_all_memory(&self) -> Result<(), AllocError> {
        let mut s = self.state.lock();
        let mut blocks = std::mem::take(&mut s.refused);
        blocks.extend(s.pending.drain_all(&*self.runtime));
        let live: Vec<Block> = s.live.drain().map(|(_, block)| block).collect();
        for block in live {
            self.stats.on_free(block.size);
            blocks.push(block);
        }
        self.release_blocks(&mut s, blocks)
    }

    fn stats(&self) -> MemoryStats {
        self.stats.snapshot()
    }
}
