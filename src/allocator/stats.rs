//! Usage counters shared by the built-in algorithms.
//!
//! Reads are lock-free. Peaks only ever grow.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time usage of one allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Bytes held from the device (in use + cached + pending reuse).
    pub reserved: usize,
    /// Bytes handed out to callers.
    pub allocated: usize,
    pub max_reserved: usize,
    pub max_allocated: usize,
}

/// Atomic reserved/allocated counters with high-water marks.
#[derive(Debug, Default)]
pub struct StatsCounters {
    reserved: AtomicUsize,
    allocated: AtomicUsize,
    max_reserved: AtomicUsize,
    max_allocated: AtomicUsize,
}

impl StatsCounters {
    pub const fn new() -> Self {
        Self {
            reserved: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
            max_reserved: AtomicUsize::new(0),
            max_allocated: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn on_reserve(&self, bytes: usize) {
        let prev = self.reserved.fetch_add(bytes, Ordering::Relaxed);
        self.max_reserved.fetch_max(prev + bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_release(&self, bytes: usize) {
        self.reserved.fetch_sub(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_allocate(&self, bytes: usize) {
        let prev = self.allocated.fetch_add(bytes, Ordering::Relaxed);
        self.max_allocated.fetch_max(prev + bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_free(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MemoryStats {
        MemoryStats {
            reserved: self.reserved.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            max_reserved: self.max_reserved.load(Ordering::Relaxed),
            max_allocated: self.max_allocated.load(Ordering::Relaxed),
        }
    }
}
