// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process-wide allocator state.
//!
//! The device runtime, the allocator context and the default device proxy
//! are created once on first use and live for the rest of the process. A
//! runtime must be installed before anything touches the context; otherwise
//! a single-device [`SimRuntime`] is used.

use std::sync::{Arc, Once, OnceLock};

use super::caching::{CachingAllocator, DataPtr};
use super::context::AllocatorContext;
use super::error::AllocError;
use super::framework::{FrameworkAllocatorTable, PROXY_PRIORITY};
use super::proxy::DeviceCachingProxy;
use super::registry::AlgorithmRegistry;
use crate::config;
use crate::device::{Device, DeviceRuntime, DeviceType, SimRuntime, Stream};

static RUNTIME: OnceLock<Arc<dyn DeviceRuntime>> = OnceLock::new();
static CONTEXT: OnceLock<Arc<AllocatorContext>> = OnceLock::new();
static DEFAULT_PROXY: OnceLock<Arc<DeviceCachingProxy>> = OnceLock::new();
static INIT: Once = Once::new();

/// Install the process device runtime. Fails once one is in place.
pub fn install_runtime(runtime: Arc<dyn DeviceRuntime>) -> Result<(), AllocError> {
    RUNTIME.set(runtime).map_err(|_| AllocError::RuntimeAlreadyInstalled)
}

pub fn runtime() -> Arc<dyn DeviceRuntime> {
    RUNTIME
        .get_or_init(|| {
            tracing::info!("no device runtime installed, using simulated runtime");
            Arc::new(SimRuntime::default())
        })
        .clone()
}

/// Process-wide allocator context.
pub fn context() -> Arc<AllocatorContext> {
    CONTEXT
        .get_or_init(|| {
            Arc::new(AllocatorContext::new(
                runtime(),
                AlgorithmRegistry::global(),
                config::selection().clone(),
            ))
        })
        .clone()
}

/// The stream-ordering proxy for the accelerator device type.
pub fn default_device_allocator() -> Arc<DeviceCachingProxy> {
    DEFAULT_PROXY
        .get_or_init(|| Arc::new(DeviceCachingProxy::new(DeviceType::Accelerator, context())))
        .clone()
}

/// Install the proxy in the framework table for the accelerator and the
/// impersonated CUDA device type. Runs once per process.
pub fn init_cached_allocator() {
    INIT.call_once(|| {
        let table = FrameworkAllocatorTable::global();
        let proxy = default_device_allocator();
        table.set_allocator(DeviceType::Accelerator, proxy.clone(), PROXY_PRIORITY);
        table.set_allocator(DeviceType::Cuda, proxy, PROXY_PRIORITY);
        tracing::info!(priority = PROXY_PRIORITY, "caching allocator proxy installed");
    });
}

pub fn get_allocator(device: Device) -> Result<Arc<dyn CachingAllocator>, AllocError> {
    context().get_allocator(device)
}

pub fn get_allocator_for_type(device_type: DeviceType) -> Result<Arc<dyn CachingAllocator>, AllocError> {
    get_allocator(Device::of_type(device_type))
}

pub fn record_stream(ptr: &DataPtr, stream: Stream) {
    ptr.record_stream(stream);
}

pub fn empty_cached_mem() {
    context().empty_cached_mem();
}

pub fn release_all_device_mem() {
    context().release_all_device_mem();
}

pub fn memory_reserved(device: Device) -> Result<usize, AllocError> {
    context().memory_reserved(device)
}

pub fn memory_allocated(device: Device) -> Result<usize, AllocError> {
    context().memory_allocated(device)
}

pub fn max_memory_reserved(device: Device) -> Result<usize, AllocError> {
    context().max_memory_reserved(device)
}

pub fn max_memory_allocated(device: Device) -> Result<usize, AllocError> {
    context().max_memory_allocated(device)
}
