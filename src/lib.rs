//! treemon - resource monitor for a process and all of its descendants.
//!
//! The library provides the pieces the `treemon` binary wires together:
//! - `collector` - filesystem abstraction and `/proc`, cgroup parsers
//! - `monitor` - resource probes and their registry
//! - `pidtree` - process tree discovery
//! - `output` - text log, JSON snapshot and summary
//! - `sampler` - the sampling loop

pub mod collector;
pub mod config;
pub mod monitor;
pub mod output;
pub mod pidtree;
pub mod process;
pub mod sampler;
pub mod signals;
pub mod util;
