// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! `algorithms` and `stats` subcommands.
//!
//! `stats` drives a short workload against a simulated two-device runtime
//! with the configured algorithms and prints per-device memory stats.

use std::sync::Arc;

use serde::Serialize;

use crate::allocator::{
    AlgorithmRegistry, AllocError, AllocatorContext, DeviceCachingProxy, FrameworkAllocator, MemoryStats,
};
use crate::config::{self, AlgorithmSelection};
use crate::device::{Device, DeviceClass, DeviceType, SimRuntime};

const SIM_DEVICES: usize = 2;
const SIM_CAPACITY: usize = 256 * 1024 * 1024;
const WORKLOAD_SIZES: &[usize] = &[512, 4096, 100_000, 1 << 20, 3 << 20];

/// Stats for one allocator after the workload.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub device: String,
    pub algorithm: String,
    pub stats: MemoryStats,
}

/// Print registered algorithms with their priorities.
pub fn run_algorithms() {
    let registry = AlgorithmRegistry::global();
    for class in [DeviceClass::Device, DeviceClass::Host] {
        for name in registry.names(class) {
            let priority = registry.priority(class, &name).unwrap_or_default();
            println!("{}\t{}\tpriority={}", class, name, priority);
        }
    }
}

/// Run the simulated workload and print the resulting stats.
///
/// Returns 0 on success, 1 if the workload failed.
pub fn run_stats(json: bool) -> i32 {
    let reports = match simulate(config::selection().clone()) {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("Workload failed: {}", e);
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Failed to encode stats: {}", e);
                return 1;
            }
        }
    } else {
        for r in &reports {
            println!(
                "{:<10} {:<4} reserved={} allocated={} max_reserved={} max_allocated={}",
                r.device,
                r.algorithm,
                r.stats.reserved,
                r.stats.allocated,
                r.stats.max_reserved,
                r.stats.max_allocated
            );
        }
    }
    0
}

fn simulate(selection: AlgorithmSelection) -> Result<Vec<DeviceReport>, AllocError> {
    let runtime = Arc::new(SimRuntime::with_devices(SIM_DEVICES, SIM_CAPACITY));
    let context = Arc::new(AllocatorContext::new(
        runtime.clone(),
        Arc::new(AlgorithmRegistry::with_builtins()),
        selection,
    ));
    let proxy = DeviceCachingProxy::new(DeviceType::Accelerator, context.clone());
    let host = DeviceCachingProxy::new(DeviceType::Cpu, context.clone());

    for index in 0..SIM_DEVICES {
        runtime.set_current_device(index)?;
        let side = runtime.create_stream(index)?;

        let mut live = Vec::new();
        for &size in WORKLOAD_SIZES {
            live.push(proxy.allocate(size)?);
        }

        // Hand half the buffers to a side stream with work still queued.
        runtime.enqueue(side);
        for ptr in live.iter().step_by(2) {
            ptr.record_stream(side);
        }
        for ptr in live {
            ptr.free()?;
        }
        runtime.retire(side);

        // Reuse after the side stream drained.
        runtime.set_current_stream(side);
        proxy.allocate(4096)?.free()?;
        runtime.set_current_stream(crate::device::Stream::default_for(index));
    }
    host.allocate(64 * 1024)?.free()?;

    let mut devices: Vec<Device> = (0..SIM_DEVICES).map(Device::accelerator).collect();
    devices.push(Device::cpu());
    devices
        .into_iter()
        .map(|device| {
            let allocator = context.get_allocator(device)?;
            Ok(DeviceReport {
                device: allocator.location().to_string(),
                algorithm: allocator.name().to_string(),
                stats: allocator.stats(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_workload_reports_every_location() {
        let reports = simulate(AlgorithmSelection::default()).unwrap();
        assert_eq!(reports.len(), SIM_DEVICES + 1);
        for r in &reports {
            assert_eq!(r.algorithm, "BF");
            assert_eq!(r.stats.allocated, 0, "{} leaked", r.device);
            assert!(r.stats.max_allocated > 0);
            assert!(r.stats.reserved <= r.stats.max_reserved);
        }
    }

    #[test]
    fn test_raw_selection_returns_everything() {
        let reports = simulate(AlgorithmSelection::new("RAW", "RAW")).unwrap();
        assert!(reports.iter().all(|r| r.algorithm == "RAW" && r.stats.reserved == 0));
    }

    #[test]
    fn test_unknown_algorithm_fails_workload() {
        let err = simulate(AlgorithmSelection::new("NOPE", "BF")).unwrap_err();
        assert!(matches!(err, AllocError::NoAlgorithm { .. }));
    }

    #[test]
    fn test_reports_serialize() {
        let reports = simulate(AlgorithmSelection::default()).unwrap();
        let json = serde_json::to_string(&reports).unwrap();
        assert!(json.contains("max_allocated"));
    }
}
