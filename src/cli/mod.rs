// Copyright 2024-2026 DevCache Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for inspecting allocator configuration.
//!
//! ## Usage
//!
//! ```bash
//! devcache-cli config show       # Effective algorithm selection
//! devcache-cli config defaults   # Built-in defaults
//! devcache-cli config validate   # Check selected algorithms are registered
//! devcache-cli algorithms        # Registered algorithms per device class
//! devcache-cli stats [--json]    # Run a simulated workload and print stats
//! ```

pub mod config_cmd;
pub mod stats_cmd;

pub use config_cmd::{run_defaults, run_show, run_validate};
pub use stats_cmd::{run_algorithms, run_stats, DeviceReport};
