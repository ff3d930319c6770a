//! Cgroup hierarchy detection and parsers.
//!
//! Supports the legacy v1 per-controller hierarchies, the v2 unified
//! hierarchy, and hybrid hosts that mount both.

pub mod parser;

use std::fmt;
use std::path::Path;

use crate::collector::traits::FileSystem;

/// Default cgroup filesystem mount point.
pub const CGROUP_MOUNT: &str = "/sys/fs/cgroup";

/// Which cgroup hierarchy the host exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    V1,
    V2,
    /// Unified hierarchy plus v1 controllers. Stats are read the v2 way.
    Hybrid,
}

impl CgroupVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            CgroupVersion::V1 => "v1",
            CgroupVersion::V2 => "v2",
            CgroupVersion::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects the cgroup version mounted at `mount`.
///
/// `cgroup.controllers` only exists on a v2 mount; a `cpu` controller
/// directory only exists on a v1 mount. Returns `None` without either.
pub fn detect_version<F: FileSystem>(fs: &F, mount: &Path) -> Option<CgroupVersion> {
    let unified = fs.exists(&mount.join("cgroup.controllers"));
    let legacy = fs.exists(&mount.join("cpu"));
    match (unified, legacy) {
        (true, true) => Some(CgroupVersion::Hybrid),
        (true, false) => Some(CgroupVersion::V2),
        (false, true) => Some(CgroupVersion::V1),
        (false, false) => None,
    }
}
