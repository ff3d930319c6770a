//! Raw data sources for the probes.
//!
//! This module provides the filesystem seam and the pure parsers for the
//! `/proc` and cgroup files the probes sample, with support for mocking so
//! that every probe can be tested without a live kernel.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     Probes (monitor::*)                   │
//! │  ┌──────────────────────┐   ┌──────────────────────────┐  │
//! │  │   procfs::parser     │   │     cgroup::parser       │  │
//! │  │  - /proc/[pid]/*     │   │  - v1 controllers        │  │
//! │  │  - /proc/meminfo     │   │  - v2 unified hierarchy  │  │
//! │  └──────────┬───────────┘   └─────────────┬────────────┘  │
//! │             └──────────────┬──────────────┘               │
//! │                     ┌──────▼──────┐                       │
//! │                     │  FileSystem │ (trait)               │
//! │                     └──────┬──────┘                       │
//! └────────────────────────────┼──────────────────────────────┘
//!              ┌───────────────┼───────────────┐
//!       ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!       │  (Linux)    │ │  (Testing)  │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use treemon::collector::{FileSystem, MockFs};
//! use std::path::Path;
//!
//! let fs = MockFs::process_tree();
//! assert!(fs.exists(Path::new("/proc/1729/stat")));
//! ```

pub mod cgroup;
pub mod mock;
pub mod procfs;
pub mod traits;

mod error;

pub use error::CollectError;
pub use mock::MockFs;
pub use procfs::ParseError;
pub use traits::{FileSystem, RealFs, ReadSeek, rooted};
