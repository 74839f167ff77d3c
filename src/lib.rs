// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! DevCache core
//!
//! A pluggable, stream-aware caching allocator for accelerator devices.
//! Tensor frameworks call one allocator per device type; DevCache sits in
//! that slot and routes each request to a caching algorithm chosen by name.
//!
//! # Layers
//!
//! - **Registry**: algorithms registered per device class with a priority
//! - **Cache**: one allocator per device, created lazily on first use
//! - **Proxy**: orders side-stream allocations after the default stream
//! - **Controller**: trims or releases every device allocator at once
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use devcache_core::allocator::{AlgorithmRegistry, AllocatorContext, DeviceCachingProxy, FrameworkAllocator};
//! use devcache_core::config::AlgorithmSelection;
//! use devcache_core::device::{DeviceType, SimRuntime};
//!
//! let runtime = Arc::new(SimRuntime::default());
//! let context = Arc::new(AllocatorContext::new(
//!     runtime,
//!     Arc::new(AlgorithmRegistry::with_builtins()),
//!     AlgorithmSelection::default(),
//! ));
//! let proxy = DeviceCachingProxy::new(DeviceType::Accelerator, context.clone());
//! let buffer = proxy.allocate(4096).unwrap();
//! assert_eq!(buffer.size(), 4096);
//! drop(buffer);
//! context.empty_cached_mem();
//! ```

pub mod allocator;
pub mod cli;
pub mod config;
pub mod device;
pub mod telemetry;

pub use allocator::{AllocError, CachingAllocator, DataPtr, MemoryStats};
pub use device::{Device, DeviceClass, DeviceRuntime, DeviceType, Stream};
