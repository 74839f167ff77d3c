// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulated device runtime with a controllable stream clock.
//!
//! Each stream keeps two counters: work items enqueued and work items retired.
//! An event captures the enqueued count at record time and completes once the
//! stream has retired at least that many items. Nothing retires on its own;
//! callers drive the clock with [`SimRuntime::retire`].

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::{DevicePtr, DeviceRuntime, Event, MemoryLocation, RuntimeError, Stream};

const DEVICE_ADDRESS_STRIDE: u64 = 1 << 40;
const HOST_ADDRESS_BASE: u64 = 0x7f00_0000_0000;

/// Configuration for the simulated runtime.
#[derive(Debug, Clone)]
pub struct SimRuntimeConfig {
    pub device_count: usize,
    pub device_capacity: usize,
    pub host_capacity: usize,
}

impl Default for SimRuntimeConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            device_capacity: 1024 * 1024 * 1024, // 1 GiB default
            host_capacity: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StreamClock {
    enqueued: u64,
    retired: u64,
}

#[derive(Debug, Clone, Copy)]
struct EventMark {
    stream: Stream,
    seq: u64,
}

#[derive(Debug, Default)]
struct ThreadState {
    device: usize,
    streams: HashMap<usize, Stream>,
}

#[derive(Debug)]
struct Heap {
    capacity: usize,
    used: usize,
    next_addr: u64,
    live: HashMap<DevicePtr, usize>,
}

impl Heap {
    fn new(base: u64, capacity: usize) -> Self {
        Self { capacity, used: 0, next_addr: base, live: HashMap::new() }
    }
}

struct SimState {
    clocks: HashMap<Stream, StreamClock>,
    next_stream_id: Vec<u64>,
    events: HashMap<u64, EventMark>,
    next_event: u64,
    threads: HashMap<ThreadId, ThreadState>,
    device_heaps: Vec<Heap>,
    host_heap: Heap,
    waits: Vec<(Stream, Stream)>,
    failing_event_records: usize,
    failing_releases: usize,
    reserve_calls: usize,
}

impl SimState {
    fn heap_mut(&mut self, location: MemoryLocation) -> Result<&mut Heap, RuntimeError> {
        let count = self.device_heaps.len();
        match location {
            MemoryLocation::Host => Ok(&mut self.host_heap),
            MemoryLocation::Device(index) => self
                .device_heaps
                .get_mut(index)
                .ok_or(RuntimeError::InvalidDevice { index, count }),
        }
    }

    fn thread_mut(&mut self) -> &mut ThreadState {
        self.threads.entry(thread::current().id()).or_default()
    }
}

/// In-process stand-in for a device runtime.
pub struct SimRuntime {
    config: SimRuntimeConfig,
    state: Mutex<SimState>,
}

impl SimRuntime {
    pub fn new(config: SimRuntimeConfig) -> Self {
        let device_heaps = (0..config.device_count)
            .map(|i| Heap::new((i as u64 + 1) * DEVICE_ADDRESS_STRIDE, config.device_capacity))
            .collect();
        let state = SimState {
            clocks: HashMap::new(),
            next_stream_id: vec![1; config.device_count],
            events: HashMap::new(),
            next_event: 1,
            threads: HashMap::new(),
            device_heaps,
            host_heap: Heap::new(HOST_ADDRESS_BASE, config.host_capacity),
            waits: Vec::new(),
            failing_event_records: 0,
            failing_releases: 0,
            reserve_calls: 0,
        };
        Self { config, state: Mutex::new(state) }
    }

    /// Runtime with `device_count` devices of `capacity` bytes each.
    pub fn with_devices(device_count: usize, capacity: usize) -> Self {
        Self::new(SimRuntimeConfig {
            device_count,
            device_capacity: capacity,
            ..SimRuntimeConfig::default()
        })
    }

    pub fn config(&self) -> &SimRuntimeConfig {
        &self.config
    }

    /// Create a new non-default stream on `device_index`.
    pub fn create_stream(&self, device_index: usize) -> Result<Stream, RuntimeError> {
        let mut s = self.state.lock();
        let count = s.next_stream_id.len();
        let next = s
            .next_stream_id
            .get_mut(device_index)
            .ok_or(RuntimeError::InvalidDevice { index: device_index, count })?;
        let stream = Stream::new(device_index, *next);
        *next += 1;
        s.clocks.insert(stream, StreamClock::default());
        Ok(stream)
    }

    /// Set the calling thread's current device.
    pub fn set_current_device(&self, device_index: usize) -> Result<(), RuntimeError> {
        if device_index >= self.config.device_count {
            return Err(RuntimeError::InvalidDevice {
                index: device_index,
                count: self.config.device_count,
            });
        }
        self.state.lock().thread_mut().device = device_index;
        Ok(())
    }

    /// Set the calling thread's current stream for the stream's device.
    pub fn set_current_stream(&self, stream: Stream) {
        self.state.lock().thread_mut().streams.insert(stream.device_index, stream);
    }

    /// Enqueue one unit of work on `stream`; returns its sequence number.
    pub fn enqueue(&self, stream: Stream) -> u64 {
        let mut s = self.state.lock();
        let clock = s.clocks.entry(stream).or_default();
        clock.enqueued += 1;
        clock.enqueued
    }

    /// Retire all work enqueued on `stream` so far.
    pub fn retire(&self, stream: Stream) {
        let mut s = self.state.lock();
        let clock = s.clocks.entry(stream).or_default();
        clock.retired = clock.enqueued;
    }

    /// Work items enqueued but not yet retired.
    pub fn pending_work(&self, stream: Stream) -> u64 {
        let s = self.state.lock();
        s.clocks.get(&stream).map(|c| c.enqueued - c.retired).unwrap_or(0)
    }

    /// Cross-stream waits inserted so far, as `(waiting, recorded_on)`.
    pub fn waits(&self) -> Vec<(Stream, Stream)> {
        self.state.lock().waits.clone()
    }

    /// Make the next `count` event records fail.
    pub fn fail_next_event_records(&self, count: usize) {
        self.state.lock().failing_event_records = count;
    }

    /// Make the next `count` releases fail, leaving the memory reserved.
    pub fn fail_next_releases(&self, count: usize) {
        self.state.lock().failing_releases = count;
    }

    /// Bytes currently reserved from `location`.
    pub fn reserved_bytes(&self, location: MemoryLocation) -> usize {
        let mut s = self.state.lock();
        s.heap_mut(location).map(|h| h.used).unwrap_or(0)
    }

    /// Number of successful raw reservations since creation.
    pub fn reserve_calls(&self) -> usize {
        self.state.lock().reserve_calls
    }

    /// Events recorded and not yet destroyed.
    pub fn live_events(&self) -> usize {
        self.state.lock().events.len()
    }
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new(SimRuntimeConfig::default())
    }
}

impl DeviceRuntime for SimRuntime {
    fn device_count(&self) -> usize {
        self.config.device_count
    }

    fn current_device(&self) -> usize {
        let s = self.state.lock();
        s.threads.get(&thread::current().id()).map(|t| t.device).unwrap_or(0)
    }

    fn current_stream(&self, device_index: usize) -> Stream {
        let s = self.state.lock();
        s.threads
            .get(&thread::current().id())
            .and_then(|t| t.streams.get(&device_index).copied())
            .unwrap_or_else(|| Stream::default_for(device_index))
    }

    fn record_event(&self, stream: Stream) -> Result<Event, RuntimeError> {
        let mut s = self.state.lock();
        if s.failing_event_records > 0 {
            s.failing_event_records -= 1;
            return Err(RuntimeError::EventFailed(format!("simulated record failure on {}", stream)));
        }
        let seq = s.clocks.entry(stream).or_default().enqueued;
        let id = s.next_event;
        s.next_event += 1;
        s.events.insert(id, EventMark { stream, seq });
        Ok(Event::from_raw(id))
    }

    fn stream_wait_event(&self, stream: Stream, event: Event) -> Result<(), RuntimeError> {
        let mut s = self.state.lock();
        let mark = *s
            .events
            .get(&event.raw())
            .ok_or_else(|| RuntimeError::EventFailed(format!("unknown event {}", event.raw())))?;
        s.waits.push((stream, mark.stream));
        Ok(())
    }

    fn event_completed(&self, event: Event) -> Result<bool, RuntimeError> {
        let s = self.state.lock();
        let mark = s
            .events
            .get(&event.raw())
            .ok_or_else(|| RuntimeError::EventFailed(format!("unknown event {}", event.raw())))?;
        let retired = s.clocks.get(&mark.stream).map(|c| c.retired).unwrap_or(0);
        Ok(retired >= mark.seq)
    }

    fn destroy_event(&self, event: Event) {
        self.state.lock().events.remove(&event.raw());
    }

    fn reserve(&self, location: MemoryLocation, size: usize) -> Result<DevicePtr, RuntimeError> {
        let mut s = self.state.lock();
        let heap = s.heap_mut(location)?;
        let available = heap.capacity - heap.used;
        if size > available {
            return Err(RuntimeError::OutOfMemory { location, requested: size, available });
        }
        let ptr = DevicePtr(heap.next_addr);
        heap.next_addr += size.max(1) as u64;
        heap.used += size;
        heap.live.insert(ptr, size);
        s.reserve_calls += 1;
        Ok(ptr)
    }

    fn release(&self, location: MemoryLocation, ptr: DevicePtr, size: usize) -> Result<(), RuntimeError> {
        let mut s = self.state.lock();
        if s.failing_releases > 0 {
            s.failing_releases -= 1;
            return Err(RuntimeError::OperationFailed(format!("simulated release failure at {}", ptr)));
        }
        let heap = s.heap_mut(location)?;
        match heap.live.remove(&ptr) {
            Some(reserved) if reserved == size => {
                heap.used -= reserved;
                Ok(())
            }
            Some(reserved) => {
                heap.live.insert(ptr, reserved);
                Err(RuntimeError::OperationFailed(format!(
                    "release size mismatch at {}: reserved {}, released {}",
                    ptr, reserved, size
                )))
            }
            None => Err(RuntimeError::OperationFailed(format!(
                "release of unknown pointer {} on {}",
                ptr, location
            ))),
        }
    }
}

#[cfg(test)]
#[path = "sim_tests.rs"]
mod tests;
