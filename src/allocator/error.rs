//! Allocator error types.
//!
//! Configuration errors are fatal and never fall back to another algorithm.

use thiserror::Error;

use crate::device::{DeviceClass, RuntimeError};

/// Errors raised by the allocator layer.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error(
        "Conflicting registration for algorithm '{name}' on {class}: priority {priority} already held by another constructor"
    )]
    ConflictingRegistration {
        name: String,
        class: DeviceClass,
        priority: u8,
    },

    #[error("No allocator registered for {class} using algorithm '{name}'")]
    NoAlgorithm { class: DeviceClass, name: String },

    #[error("Invalid device index {index} (device count {count})")]
    InvalidDevice { index: usize, count: usize },

    #[error("Device runtime already installed")]
    RuntimeAlreadyInstalled,

    #[error("Device runtime error: {0}")]
    DeviceRuntime(#[from] RuntimeError),

    #[error("Out of memory: requested {requested} bytes, reserved {reserved} bytes, allocated {allocated} bytes")]
    OutOfMemory {
        requested: usize,
        reserved: usize,
        allocated: usize,
    },

    #[error("Unknown allocation id={0} (double free or freed after release)")]
    UnknownAllocation(u64),
}

impl AllocError {
    /// Returns true for registration/selection errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConflictingRegistration { .. }
                | Self::NoAlgorithm { .. }
                | Self::InvalidDevice { .. }
                | Self::RuntimeAlreadyInstalled
        )
    }

    /// Returns true if this error reports memory exhaustion.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
