// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Stream-ordering proxy.
//!
//! Memory handed out by an allocator may have been freed by work still
//! running on the default stream; frees on the default stream are not
//! recorded against any other stream. When a caller allocates while a
//! non-default stream is current, the proxy records an event on the default
//! stream and makes the current stream wait on it before delegating. Callers
//! therefore never synchronize with the default stream by hand.
//!
//! The wait is inserted even when the block turns out to be freshly reserved.

use std::sync::Arc;

use super::caching::DataPtr;
use super::context::AllocatorContext;
use super::error::AllocError;
use super::framework::FrameworkAllocator;
use crate::device::{Device, DeviceClass, DeviceType};

/// Framework-facing allocator for one device type.
pub struct DeviceCachingProxy {
    device_type: DeviceType,
    context: Arc<AllocatorContext>,
}

impl DeviceCachingProxy {
    pub fn new(device_type: DeviceType, context: Arc<AllocatorContext>) -> Self {
        Self { device_type, context }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn context(&self) -> &Arc<AllocatorContext> {
        &self.context
    }

    /// Make the current stream wait for prior default-stream work.
    fn order_after_default_stream(&self) -> Result<(), AllocError> {
        let runtime = self.context.runtime();
        let device_index = runtime.current_device();
        let current = runtime.current_stream(device_index);
        let default = runtime.default_stream(device_index);
        if current == default {
            return Ok(());
        }
        let event = runtime.record_event(default)?;
        let waited = runtime.stream_wait_event(current, event);
        runtime.destroy_event(event);
        waited?;
        tracing::trace!(%current, %default, "allocation ordered after default stream");
        Ok(())
    }
}

impl FrameworkAllocator for DeviceCachingProxy {
    fn allocate(&self, size: usize) -> Result<DataPtr, AllocError> {
        if self.device_type.class() == DeviceClass::Device {
            self.order_after_default_stream()?;
        }
        let allocator = self.context.get_allocator(Device::of_type(self.device_type))?;
        let allocation = allocator.allocate(size)?;
        Ok(DataPtr::new(allocation, allocator))
    }
}
