// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These read the environment directly; nothing is allocated.

use crate::allocator::AlgorithmRegistry;
use crate::config::{self, EffectiveConfig, DEFAULT_MEMCACHING_ALGORITHM, DEVICE_ALGORITHM_ENV, HOST_ALGORITHM_ENV};
use crate::device::DeviceClass;

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("{}={}", DEVICE_ALGORITHM_ENV, DEFAULT_MEMCACHING_ALGORITHM);
    println!("{}={}", HOST_ALGORITHM_ENV, DEFAULT_MEMCACHING_ALGORITHM);
}

/// Check that both selected algorithms are registered.
///
/// Returns 0 if valid, 1 if any name is unknown.
pub fn run_validate() -> i32 {
    let cfg = config::load().effective_config();
    let registry = AlgorithmRegistry::global();
    let problems = validate(&cfg, &registry);

    for problem in &problems {
        eprintln!("WARNING: {}", problem);
    }
    if problems.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(cfg: &EffectiveConfig, registry: &AlgorithmRegistry) -> Vec<String> {
    let checks = [
        (DEVICE_ALGORITHM_ENV, DeviceClass::Device, &cfg.device_algorithm),
        (HOST_ALGORITHM_ENV, DeviceClass::Host, &cfg.host_algorithm),
    ];
    checks
        .into_iter()
        .filter(|(_, class, name)| registry.priority(*class, name.as_str()).is_none())
        .map(|(key, class, name)| {
            format!(
                "{}={} is not registered for {} (known: {})",
                key,
                name,
                class,
                registry.names(class).join(", ")
            )
        })
        .collect()
}

fn print_config(cfg: &EffectiveConfig) {
    println!("{}={}", DEVICE_ALGORITHM_ENV, cfg.device_algorithm);
    println!("{}={}", HOST_ALGORITHM_ENV, cfg.host_algorithm);
}
