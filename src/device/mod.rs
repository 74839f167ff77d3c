// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Device runtime primitives.
//!
//! Streams, events and raw memory reservation are provided by the device
//! runtime. This module only fixes the shape of that boundary; the allocator
//! layer talks to it exclusively through [`DeviceRuntime`].

mod sim;

use std::fmt;

use thiserror::Error;

pub use sim::{SimRuntime, SimRuntimeConfig};

/// Device types as seen by the host tensor framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceType {
    /// The native accelerator device type.
    Accelerator,
    /// CUDA device type, impersonated by the accelerator.
    Cuda,
    /// Host CPU (pinned host memory).
    Cpu,
}

impl DeviceType {
    /// Memory class backing this device type.
    pub fn class(self) -> DeviceClass {
        match self {
            DeviceType::Cpu => DeviceClass::Host,
            DeviceType::Accelerator | DeviceType::Cuda => DeviceClass::Device,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Accelerator => write!(f, "accel"),
            DeviceType::Cuda => write!(f, "cuda"),
            DeviceType::Cpu => write!(f, "cpu"),
        }
    }
}

/// Memory class an allocator serves. Algorithms are registered per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceClass {
    /// Accelerator device memory.
    Device,
    /// Pinned host memory.
    Host,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Device => write!(f, "device"),
            DeviceClass::Host => write!(f, "host"),
        }
    }
}

/// A device reference, optionally pinned to an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    pub kind: DeviceType,
    pub index: Option<usize>,
}

impl Device {
    /// Device without an explicit index (resolved at use).
    pub fn of_type(kind: DeviceType) -> Self {
        Self { kind, index: None }
    }

    /// Accelerator device with an explicit index.
    pub fn accelerator(index: usize) -> Self {
        Self { kind: DeviceType::Accelerator, index: Some(index) }
    }

    /// Host (pinned memory) device.
    pub fn cpu() -> Self {
        Self { kind: DeviceType::Cpu, index: None }
    }

    pub fn is_cpu(&self) -> bool {
        self.kind == DeviceType::Cpu
    }

    pub fn class(&self) -> DeviceClass {
        self.kind.class()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{}", self.kind, index),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Ordered execution queue on a device. Id 0 is the device default stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stream {
    pub device_index: usize,
    pub id: u64,
}

impl Stream {
    pub const DEFAULT_ID: u64 = 0;

    pub fn new(device_index: usize, id: u64) -> Self {
        Self { device_index, id }
    }

    /// Default stream of `device_index`.
    pub fn default_for(device_index: usize) -> Self {
        Self { device_index, id: Self::DEFAULT_ID }
    }

    pub fn is_default(&self) -> bool {
        self.id == Self::DEFAULT_ID
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream {}@{}", self.id, self.device_index)
    }
}

/// Opaque synchronization point recorded on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event(u64);

impl Event {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Address of reserved memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePtr(pub u64);

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Where raw memory is reserved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    Device(usize),
    Host,
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLocation::Device(index) => write!(f, "device:{}", index),
            MemoryLocation::Host => write!(f, "host"),
        }
    }
}

/// Device runtime failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Out of memory on {location}: requested {requested} bytes, available {available} bytes")]
    OutOfMemory {
        location: MemoryLocation,
        requested: usize,
        available: usize,
    },

    #[error("Invalid device index {index} (device count {count})")]
    InvalidDevice { index: usize, count: usize },

    #[error("Event operation failed: {0}")]
    EventFailed(String),

    #[error("Device operation failed: {0}")]
    OperationFailed(String),
}

/// Primitives the allocator layer consumes from the device runtime.
///
/// Current device and current stream are per calling thread.
pub trait DeviceRuntime: Send + Sync {
    fn device_count(&self) -> usize;

    /// Device active on the calling thread.
    fn current_device(&self) -> usize;

    fn current_stream(&self, device_index: usize) -> Stream;

    fn default_stream(&self, device_index: usize) -> Stream {
        Stream::default_for(device_index)
    }

    /// Record an event capturing all work enqueued on `stream` so far.
    fn record_event(&self, stream: Stream) -> Result<Event, RuntimeError>;

    /// Make `stream` wait for `event` before running later work.
    fn stream_wait_event(&self, stream: Stream, event: Event) -> Result<(), RuntimeError>;

    /// Non-blocking completion query.
    fn event_completed(&self, event: Event) -> Result<bool, RuntimeError>;

    /// Release an event handle.
    fn destroy_event(&self, event: Event);

    fn reserve(&self, location: MemoryLocation, size: usize) -> Result<DevicePtr, RuntimeError>;

    fn release(&self, location: MemoryLocation, ptr: DevicePtr, size: usize) -> Result<(), RuntimeError>;
}
