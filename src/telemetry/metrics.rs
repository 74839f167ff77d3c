//! Allocator memory gauges.

use ::metrics::{describe_gauge, gauge, Unit};

use crate::allocator::MemoryStats;

pub const MEMORY_RESERVED: &str = "devcache_memory_reserved_bytes";
pub const MEMORY_ALLOCATED: &str = "devcache_memory_allocated_bytes";
pub const MAX_MEMORY_RESERVED: &str = "devcache_max_memory_reserved_bytes";
pub const MAX_MEMORY_ALLOCATED: &str = "devcache_max_memory_allocated_bytes";

/// Register gauge descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_gauge!(MEMORY_RESERVED, Unit::Bytes, "Bytes held from the device by the allocator");
    describe_gauge!(MEMORY_ALLOCATED, Unit::Bytes, "Bytes handed out to callers");
    describe_gauge!(MAX_MEMORY_RESERVED, Unit::Bytes, "Peak reserved bytes");
    describe_gauge!(MAX_MEMORY_ALLOCATED, Unit::Bytes, "Peak allocated bytes");
}

/// Publish one allocator's stats, labelled by memory location.
///
/// A no-op when no recorder is installed.
pub fn record_allocator_stats(device: &str, stats: &MemoryStats) {
    gauge!(MEMORY_RESERVED, "device" => device.to_string()).set(stats.reserved as f64);
    gauge!(MEMORY_ALLOCATED, "device" => device.to_string()).set(stats.allocated as f64);
    gauge!(MAX_MEMORY_RESERVED, "device" => device.to_string()).set(stats.max_reserved as f64);
    gauge!(MAX_MEMORY_ALLOCATED, "device" => device.to_string()).set(stats.max_allocated as f64);
}
