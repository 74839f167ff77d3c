// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Allocator context: the per-device allocator cache.
//!
//! Owns the lookup table and resolves each slot through the algorithm
//! registry on first use. This is the only place concrete allocators are
//! created; nothing destroys them.

use std::sync::Arc;

use super::caching::{AllocatorTarget, CachingAllocator, DataPtr};
use super::error::AllocError;
use super::lookup::{AllocatorTable, UsedAllocatorSet};
use super::registry::AlgorithmRegistry;
use crate::config::AlgorithmSelection;
use crate::device::{Device, DeviceClass, DeviceRuntime, Stream};

/// Device index handed to host allocator constructors.
pub const HOST_DEVICE_INDEX: usize = 0;

pub struct AllocatorContext {
    runtime: Arc<dyn DeviceRuntime>,
    registry: Arc<AlgorithmRegistry>,
    selection: AlgorithmSelection,
    table: AllocatorTable,
    used: UsedAllocatorSet,
}

impl AllocatorContext {
    /// Table size is fixed from the runtime's device count at this point.
    pub fn new(
        runtime: Arc<dyn DeviceRuntime>,
        registry: Arc<AlgorithmRegistry>,
        selection: AlgorithmSelection,
    ) -> Self {
        let table = AllocatorTable::new(runtime.device_count());
        Self {
            runtime,
            registry,
            selection,
            table,
            used: UsedAllocatorSet::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn DeviceRuntime> {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<AlgorithmRegistry> {
        &self.registry
    }

    pub fn selection(&self) -> &AlgorithmSelection {
        &self.selection
    }

    pub fn used_allocators(&self) -> &UsedAllocatorSet {
        &self.used
    }

    /// Index for `device`: CPU maps to `host_index`, an explicit index is
    /// taken as is, otherwise the current device of the calling thread.
    pub fn device_index(&self, device: &Device, host_index: usize) -> Result<usize, AllocError> {
        if device.is_cpu() {
            return Ok(host_index);
        }
        let count = self.runtime.device_count();
        let index = device.index.unwrap_or_else(|| self.runtime.current_device());
        if index >= count {
            return Err(AllocError::InvalidDevice { index, count });
        }
        Ok(index)
    }

    /// Allocator serving `device`, created on first use.
    pub fn get_allocator(&self, device: Device) -> Result<Arc<dyn CachingAllocator>, AllocError> {
        let slot = self.device_index(&device, self.table.host_index())?;
        self.table.get_or_try_init(slot, || self.create_allocator(&device))
    }

    fn create_allocator(&self, device: &Device) -> Result<Arc<dyn CachingAllocator>, AllocError> {
        let class = device.class();
        let algorithm = self.selection.for_class(class);
        let constructor = self.registry.resolve(class, algorithm)?;
        let target = AllocatorTarget {
            class,
            device_index: self.device_index(device, HOST_DEVICE_INDEX)?,
            runtime: self.runtime.clone(),
        };
        let allocator = constructor(&target);
        if class == DeviceClass::Device {
            self.used.insert(allocator.clone());
        }
        tracing::info!(
            %device,
            %class,
            algorithm,
            location = %allocator.location(),
            "caching allocator created"
        );
        Ok(allocator)
    }

    /// Record that `stream` may still use `ptr`. See [`DataPtr::record_stream`].
    pub fn record_stream(&self, ptr: &DataPtr, stream: Stream) {
        ptr.record_stream(stream);
    }
}
