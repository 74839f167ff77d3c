// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! Algorithm registry: (device class, algorithm name) → constructor.
//!
//! Entries only accumulate. For one name, the highest priority wins:
//!
//! | existing | incoming | result |
//! |---|---|---|
//! | none | any | inserted |
//! | priority p | priority > p | replaced |
//! | same constructor | priority <= p | unchanged |
//! | other constructor | priority < p | unchanged |
//! | other constructor | priority == p | `ConflictingRegistration` |

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::best_fit::{self, BestFitAllocator};
use super::caching::{AllocatorTarget, CachingAllocator};
use super::error::AllocError;
use super::raw::{self, RawAllocator};
use crate::device::DeviceClass;

/// Builds one allocator instance for a lookup slot.
pub type AllocatorConstructor =
    Arc<dyn Fn(&AllocatorTarget) -> Arc<dyn CachingAllocator> + Send + Sync>;

/// Priority of the algorithms shipped with this crate.
pub const BUILTIN_PRIORITY: u8 = 0;

/// Wrap a closure as an [`AllocatorConstructor`].
pub fn constructor<F>(f: F) -> AllocatorConstructor
where
    F: Fn(&AllocatorTarget) -> Arc<dyn CachingAllocator> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
struct AlgorithmEntry {
    constructor: AllocatorConstructor,
    priority: u8,
}

/// Outcome of a successful [`AlgorithmRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    Replaced,
    Unchanged,
}

/// Thread-safe table of registered algorithms.
pub struct AlgorithmRegistry {
    table: Mutex<HashMap<DeviceClass, HashMap<String, AlgorithmEntry>>>,
}

impl AlgorithmRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { table: Mutex::new(HashMap::new()) }
    }

    /// Registry holding `BF` and `RAW` for both classes.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let bf = constructor(|t| Arc::new(BestFitAllocator::new(t)) as Arc<dyn CachingAllocator>);
        let raw = constructor(|t| Arc::new(RawAllocator::new(t)) as Arc<dyn CachingAllocator>);
        for class in [DeviceClass::Device, DeviceClass::Host] {
            let mut table = registry.table.lock();
            let names = table.entry(class).or_default();
            names.insert(
                best_fit::NAME.to_string(),
                AlgorithmEntry { constructor: bf.clone(), priority: BUILTIN_PRIORITY },
            );
            names.insert(
                raw::NAME.to_string(),
                AlgorithmEntry { constructor: raw.clone(), priority: BUILTIN_PRIORITY },
            );
        }
        registry
    }

    /// Process-wide registry, created with the built-ins on first use.
    pub fn global() -> Arc<AlgorithmRegistry> {
        static GLOBAL: OnceLock<Arc<AlgorithmRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::with_builtins())).clone()
    }

    /// Register `constructor` as algorithm `name` for `class`.
    pub fn register(
        &self,
        name: &str,
        class: DeviceClass,
        constructor: AllocatorConstructor,
        priority: u8,
    ) -> Result<Registration, AllocError> {
        let mut table = self.table.lock();
        let names = table.entry(class).or_default();
        let outcome = match names.get(name) {
            None => Registration::Inserted,
            Some(existing) if priority > existing.priority => Registration::Replaced,
            Some(existing) if Arc::ptr_eq(&existing.constructor, &constructor) => {
                Registration::Unchanged
            }
            Some(existing) if priority < existing.priority => Registration::Unchanged,
            Some(_) => {
                return Err(AllocError::ConflictingRegistration {
                    name: name.to_string(),
                    class,
                    priority,
                });
            }
        };
        if outcome != Registration::Unchanged {
            names.insert(name.to_string(), AlgorithmEntry { constructor, priority });
        }
        tracing::debug!(algorithm = name, %class, priority, ?outcome, "allocator registration");
        Ok(outcome)
    }

    /// Constructor registered for `(class, name)`.
    pub fn resolve(&self, class: DeviceClass, name: &str) -> Result<AllocatorConstructor, AllocError> {
        self.table
            .lock()
            .get(&class)
            .and_then(|names| names.get(name))
            .map(|entry| entry.constructor.clone())
            .ok_or_else(|| AllocError::NoAlgorithm { class, name: name.to_string() })
    }

    /// Priority of the active entry for `(class, name)`.
    pub fn priority(&self, class: DeviceClass, name: &str) -> Option<u8> {
        self.table.lock().get(&class).and_then(|names| names.get(name)).map(|e| e.priority)
    }

    /// Sorted algorithm names registered for `class`.
    pub fn names(&self, class: DeviceClass) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .lock()
            .get(&class)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}
