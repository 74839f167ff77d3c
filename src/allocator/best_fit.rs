// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Best-fit caching allocator (`BF`).
//!
//! Requests are rounded to a bucket: a power of two (minimum 512 B) below
//! 2 MiB, a 2 MiB multiple above. Freed blocks go to a free pool ordered by
//! `(size, address)` and the smallest block that fits is reused, as long as it
//! is at most `max_fit_ratio` times the rounded request. Blocks are never split.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::caching::{allocating_stream, Allocation, AllocatorTarget, CachingAllocator};
use super::error::AllocError;
use super::reclaim::{destroy_events, record_free_events, PendingFrees};
use super::stats::{MemoryStats, StatsCounters};
use crate::device::{DeviceClass, DevicePtr, DeviceRuntime, MemoryLocation, RuntimeError};

/// Registered name of this algorithm.
pub const NAME: &str = "BF";

const MIN_BLOCK: usize = 512;
const LARGE_ALIGNMENT: usize = 2 * 1024 * 1024; // 2 MiB

/// What to do when the device refuses a reservation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OomPolicy {
    /// Release the free cache back to the device and retry once.
    #[default]
    EmptyCacheAndRetry,
    /// Fail immediately.
    Fail,
}

/// Tunables for [`BestFitAllocator`].
#[derive(Debug, Clone)]
pub struct BestFitConfig {
    pub oom_policy: OomPolicy,
    pub max_fit_ratio: usize,
}

impl Default for BestFitConfig {
    fn default() -> Self {
        Self { oom_policy: OomPolicy::default(), max_fit_ratio: 2 }
    }
}

/// Round `size` up to its bucket, or `None` if the bucket overflows `usize`.
#[inline]
pub fn round_size(size: usize) -> Option<usize> {
    if size < LARGE_ALIGNMENT {
        size.max(MIN_BLOCK).checked_next_power_of_two()
    } else {
        size.div_ceil(LARGE_ALIGNMENT).checked_mul(LARGE_ALIGNMENT)
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    ptr: DevicePtr,
    size: usize,
}

struct PoolState {
    free: BTreeSet<(usize, DevicePtr)>,
    live: HashMap<u64, Block>,
    pending: PendingFrees<Block>,
}

/// Best-fit caching allocator for one device (or the host).
pub struct BestFitAllocator {
    class: DeviceClass,
    location: MemoryLocation,
    runtime: Arc<dyn DeviceRuntime>,
    config: BestFitConfig,
    next_id: AtomicU64,
    stats: StatsCounters,
    state: Mutex<PoolState>,
}

impl BestFitAllocator {
    pub fn new(target: &AllocatorTarget) -> Self {
        Self::with_config(target, BestFitConfig::default())
    }

    pub fn with_config(target: &AllocatorTarget, config: BestFitConfig) -> Self {
        Self {
            class: target.class,
            location: target.location(),
            runtime: target.runtime.clone(),
            config,
            next_id: AtomicU64::new(1),
            stats: StatsCounters::new(),
            state: Mutex::new(PoolState {
                free: BTreeSet::new(),
                live: HashMap::new(),
                pending: PendingFrees::new(),
            }),
        }
    }

    /// Blocks cached and ready for reuse.
    pub fn cached_blocks(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Blocks freed but still waiting on recorded streams.
    pub fn pending_blocks(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn reclaim_ready(&self, s: &mut PoolState) {
        for block in s.pending.collect_ready(&*self.runtime) {
            tracing::trace!(ptr = %block.ptr, size = block.size, "parked block reclaimed");
            s.free.insert((block.size, block.ptr));
        }
    }

    fn take_best_fit(&self, s: &mut PoolState, size: usize) -> Option<Block> {
        let limit = size.saturating_mul(self.config.max_fit_ratio.max(1));
        let &(found, ptr) = s.free.range((size, DevicePtr(0))..).next()?;
        if found > limit {
            return None;
        }
        s.free.remove(&(found, ptr));
        Some(Block { ptr, size: found })
    }

    /// Release every free block and return the bytes released. Blocks the
    /// device refuses stay cached and the first refusal is reported.
    fn release_cached(&self, s: &mut PoolState) -> (usize, Option<RuntimeError>) {
        let mut released = 0;
        let mut first_err = None;
        let blocks: Vec<(usize, DevicePtr)> = std::mem::take(&mut s.free).into_iter().collect();
        for (size, ptr) in blocks {
            match self.runtime.release(self.location, ptr, size) {
                Ok(()) => {
                    self.stats.on_release(size);
                    released += size;
                }
                Err(e) => {
                    s.free.insert((size, ptr));
                    first_err.get_or_insert(e);
                }
            }
        }
        (released, first_err)
    }

    fn reserve_block(&self, s: &mut PoolState, size: usize) -> Result<Block, AllocError> {
        match self.runtime.reserve(self.location, size) {
            Ok(ptr) => Ok(self.account_reserve(ptr, size)),
            Err(RuntimeError::OutOfMemory { .. }) if self.config.oom_policy == OomPolicy::EmptyCacheAndRetry => {
                let (released, err) = self.release_cached(s);
                if let Some(e) = err {
                    tracing::warn!(location = %self.location, error = %e, "cached block release failed before retry");
                }
                tracing::debug!(location = %self.location, released, "out of memory, cache emptied before retry");
                match self.runtime.reserve(self.location, size) {
                    Ok(ptr) => Ok(self.account_reserve(ptr, size)),
                    Err(RuntimeError::OutOfMemory { .. }) => Err(self.out_of_memory(size)),
                    Err(e) => Err(e.into()),
                }
            }
            Err(RuntimeError::OutOfMemory { .. }) => Err(self.out_of_memory(size)),
            Err(e) => Err(e.into()),
        }
    }

    fn account_reserve(&self, ptr: DevicePtr, size: usize) -> Block {
        self.stats.on_reserve(size);
        tracing::trace!(location = %self.location, ptr = %ptr, size, "reserved new block");
        Block { ptr, size }
    }

    fn out_of_memory(&self, requested: usize) -> AllocError {
        let stats = self.stats.snapshot();
        AllocError::OutOfMemory {
            requested,
            reserved: stats.reserved,
            allocated: stats.allocated,
        }
    }
}

impl CachingAllocator for BestFitAllocator {
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
        let Some(rounded) = round_size(size) else {
            return Err(self.out_of_memory(size));
        };
        let stream = allocating_stream(&*self.runtime, self.location);
        let mut s = self.state.lock();
        self.reclaim_ready(&mut s);
        let block = match self.take_best_fit(&mut s, rounded) {
            Some(block) => block,
            None => self.reserve_block(&mut s, rounded)?,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        s.live.insert(id, block);
        self.stats.on_allocate(block.size);
        Ok(Allocation::new(id, block.ptr, block.size, size, self.location, stream))
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
            s.free.insert((block.size, block.ptr));
        } else {
            tracing::trace!(id = allocation.id, streams = events.len(), "block parked until recorded streams retire");
            s.pending.push(block, events);
        }
        Ok(())
    }

    fn empty_cache(&self) -> Result<(), AllocError> {
        let mut s = self.state.lock();
        self.reclaim_ready(&mut s);
        let (released, err) = self.release_cached(&mut s);
        tracing::debug!(location = %self.location, released, parked = s.pending.len(), "cache emptied");
        err.map_or(Ok(()), |e| Err(e.into()))
    }

    fn release_all_memory(&self) -> Result<(), AllocError> {
        let mut s = self.state.lock();
        for block in s.pending.drain_all(&*self.runtime) {
            s.free.insert((block.size, block.ptr));
        }
        let live: Vec<Block> = s.live.drain().map(|(_, block)| block).collect();
        for block in live {
            self.stats.on_free(block.size);
            s.free.insert((block.size, block.ptr));
        }
        let (released, err) = self.release_cached(&mut s);
        tracing::debug!(location = %self.location, released, "all memory released");
        err.map_or(Ok(()), |e| Err(e.into()))
    }

    fn stats(&self) -> MemoryStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
#[path = "best_fit_tests.rs"]
mod tests;
