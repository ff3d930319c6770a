//! Mock filesystem implementations for testing.
//!
//! This module provides `MockFs` and pre-built scenarios for testing
//! probes without requiring actual Linux `/proc` or `/sys` access.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::{io_file, smaps_rollup, stat_line};
