//! Algorithm selection loaded from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `DEVCACHE_DEVICE_MEMCACHING_ALGORITHM` | BF | Caching algorithm for device memory |
//! | `DEVCACHE_HOST_MEMCACHING_ALGORITHM` | BF | Caching algorithm for pinned host memory |
//!
//! The process-wide selection is read once, on first use, and never again.
//! Unset or blank values fall back to the default. Unknown names are not
//! validated here; they fail when the first allocator is resolved.

use std::sync::OnceLock;

use serde::Serialize;

use crate::device::DeviceClass;

/// Algorithm used when no environment override is set.
pub const DEFAULT_MEMCACHING_ALGORITHM: &str = "BF";

pub const DEVICE_ALGORITHM_ENV: &str = "DEVCACHE_DEVICE_MEMCACHING_ALGORITHM";
pub const HOST_ALGORITHM_ENV: &str = "DEVCACHE_HOST_MEMCACHING_ALGORITHM";

/// Algorithm names chosen per device class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlgorithmSelection {
    pub device: String,
    pub host: String,
}

impl AlgorithmSelection {
    pub fn new(device: impl Into<String>, host: impl Into<String>) -> Self {
        Self { device: device.into(), host: host.into() }
    }

    pub fn for_class(&self, class: DeviceClass) -> &str {
        match class {
            DeviceClass::Device => &self.device,
            DeviceClass::Host => &self.host,
        }
    }
}

impl Default for AlgorithmSelection {
    fn default() -> Self {
        Self::new(DEFAULT_MEMCACHING_ALGORITHM, DEFAULT_MEMCACHING_ALGORITHM)
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub device_algorithm: String,
    pub host_algorithm: String,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub selection: AlgorithmSelection,
}

/// Read an algorithm name, returning `default` on missing or blank.
fn parse_name(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Load configuration from the current environment.
pub fn load() -> EnvConfig {
    EnvConfig {
        selection: AlgorithmSelection::new(
            parse_name(DEVICE_ALGORITHM_ENV, DEFAULT_MEMCACHING_ALGORITHM),
            parse_name(HOST_ALGORITHM_ENV, DEFAULT_MEMCACHING_ALGORITHM),
        ),
    }
}

/// Process-wide selection, fixed at first call.
pub fn selection() -> &'static AlgorithmSelection {
    static SELECTION: OnceLock<AlgorithmSelection> = OnceLock::new();
    SELECTION.get_or_init(|| load().selection)
}

impl EnvConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            device_algorithm: self.selection.device.clone(),
            host_algorithm: self.selection.host.clone(),
        }
    }
}
