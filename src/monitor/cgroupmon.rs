//! Container probe: CPU, memory, I/O and task counts of the cgroup the
//! monitored root process belongs to.
//!
//! The hierarchy version is detected once at construction. Metrics whose
//! source file does not exist on the first sample are removed and no longer
//! reported.
//!
//! Averages follow each parameter's unit. Cumulative counters (page faults,
//! I/O bytes) carry a `/s` unit and are averaged as a rate over the elapsed
//! wall time. Gauges (memory, CPU time, task counts) report the running mean
//! of their samples.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap};
use crate::collector::cgroup::parser::{
    CgroupMembership, count_ids, parse_blkio_service_bytes, parse_cpu_stat, parse_cpu_stat_v1,
    parse_cpuacct_stat, parse_io_stat, parse_memory_max, parse_memory_stat,
    parse_memory_stat_v1, parse_proc_cgroup, parse_single_value,
};
use crate::collector::cgroup::{CGROUP_MOUNT, CgroupVersion, detect_version};
use crate::collector::{CollectError, FileSystem, RealFs, rooted};
use crate::util::clock_ticks;

pub const NAME: &str = "cgroupmon";

const PARAMS: &[Parameter] = &[
    Parameter::new("cgroup_cpu_user", "us", "us"),
    Parameter::new("cgroup_cpu_system", "us", "us"),
    Parameter::new("cgroup_cpu_total", "us", "us"),
    Parameter::new("cgroup_cpu_throttled", "us", ""),
    Parameter::new("cgroup_cpu_periods", "1", ""),
    Parameter::new("cgroup_mem_current", "kB", "kB"),
    Parameter::new("cgroup_mem_max", "kB", ""),
    Parameter::new("cgroup_mem_anon", "kB", "kB"),
    Parameter::new("cgroup_mem_file", "kB", "kB"),
    Parameter::new("cgroup_mem_kernel", "kB", "kB"),
    Parameter::new("cgroup_mem_slab", "kB", "kB"),
    Parameter::new("cgroup_mem_pgfault", "1", "1/s"),
    Parameter::new("cgroup_mem_pgmajfault", "1", "1/s"),
    Parameter::new("cgroup_io_read", "B", "B/s"),
    Parameter::new("cgroup_io_write", "B", "B/s"),
    Parameter::new("cgroup_nprocs", "1", "1"),
    Parameter::new("cgroup_nthreads", "1", "1"),
];

const CPU_TIMES: &[&str] = &["cgroup_cpu_user", "cgroup_cpu_system", "cgroup_cpu_total"];
const CPU_THROTTLING: &[&str] = &["cgroup_cpu_periods", "cgroup_cpu_throttled"];
const MEM_BREAKDOWN: &[&str] = &[
    "cgroup_mem_anon",
    "cgroup_mem_file",
    "cgroup_mem_kernel",
    "cgroup_mem_slab",
    "cgroup_mem_pgfault",
    "cgroup_mem_pgmajfault",
];
const IO_BYTES: &[&str] = &["cgroup_io_read", "cgroup_io_write"];

const BYTES_TO_KB: u64 = 1024;

/// Values gathered from the cgroup files in one sample.
#[derive(Debug, Default)]
struct Reading {
    values: Vec<(&'static str, u64)>,
    /// Metrics whose source file could not be read.
    unavailable: Vec<&'static str>,
}

impl Reading {
    /// Reads one source file. `provides` lists every metric the file feeds,
    /// including ones `parse` may legitimately leave out.
    fn source<F, P>(&mut self, fs: &F, path: Option<PathBuf>, provides: &[&'static str], parse: P)
    where
        F: FileSystem,
        P: FnOnce(&str) -> Vec<(&'static str, u64)>,
    {
        let Some(path) = path else {
            self.unavailable.extend_from_slice(provides);
            return;
        };
        match fs.read_to_string(&path) {
            Ok(content) => self.values.extend(parse(&content)),
            Err(e) => {
                debug!(monitor = NAME, path = %path.display(), error = %e, "cgroup file unreadable");
                self.unavailable.extend_from_slice(provides);
            }
        }
    }
}

pub struct CgroupMonitor<F: FileSystem = RealFs> {
    fs: F,
    version: Option<CgroupVersion>,
    mount: PathBuf,
    values: MonitoredValues,
    clock_ticks: u64,
    sampled: bool,
}

impl CgroupMonitor<RealFs> {
    pub fn new() -> Self {
        Self::with_fs(RealFs::new())
    }
}

impl Default for CgroupMonitor<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> CgroupMonitor<F> {
    pub fn with_fs(fs: F) -> Self {
        let mount = PathBuf::from(CGROUP_MOUNT);
        let version = detect_version(&fs, &mount);
        let clock_ticks = clock_ticks();
        let mut values = MonitoredValues::new(PARAMS, false, clock_ticks);
        match version {
            Some(version) => {
                info!(monitor = NAME, %version, "cgroup monitoring enabled");
                // v1 memory.stat has no kernel memory breakdown.
                if version == CgroupVersion::V1 {
                    values.remove("cgroup_mem_kernel");
                }
            }
            None => info!(monitor = NAME, "no cgroup support detected"),
        }
        Self {
            fs,
            version,
            mount,
            values,
            clock_ticks,
            sampled: false,
        }
    }

    /// The detected hierarchy version, if any.
    pub fn version(&self) -> Option<CgroupVersion> {
        self.version
    }

    fn memberships(&self, pid: u32, read_root: Option<&Path>) -> Result<Vec<CgroupMembership>, CollectError> {
        let content = self
            .fs
            .read_to_string(&rooted(read_root, format!("/proc/{}/cgroup", pid)))?;
        Ok(parse_proc_cgroup(&content))
    }

    fn read_v2(&self, base: PathBuf) -> Reading {
        let fs = &self.fs;
        let mut r = Reading::default();
        r.source(fs, Some(base.join("cpu.stat")), &[CPU_TIMES, CPU_THROTTLING].concat(), |c| {
            let s = parse_cpu_stat(c);
            vec![
                ("cgroup_cpu_user", s.user_usec),
                ("cgroup_cpu_system", s.system_usec),
                ("cgroup_cpu_total", s.usage_usec),
                ("cgroup_cpu_periods", s.nr_periods),
                ("cgroup_cpu_throttled", s.throttled_usec),
            ]
        });
        r.source(fs, Some(base.join("memory.stat")), MEM_BREAKDOWN, |c| {
            let s = parse_memory_stat(c);
            vec![
                ("cgroup_mem_anon", s.anon / BYTES_TO_KB),
                ("cgroup_mem_file", s.file / BYTES_TO_KB),
                ("cgroup_mem_kernel", s.kernel / BYTES_TO_KB),
                ("cgroup_mem_slab", s.slab / BYTES_TO_KB),
                ("cgroup_mem_pgfault", s.pgfault),
                ("cgroup_mem_pgmajfault", s.pgmajfault),
            ]
        });
        r.source(fs, Some(base.join("memory.current")), &["cgroup_mem_current"], |c| {
            single("cgroup_mem_current", parse_single_value(c).map(|v| v / BYTES_TO_KB))
        });
        r.source(fs, Some(base.join("memory.max")), &["cgroup_mem_max"], |c| {
            single("cgroup_mem_max", parse_memory_max(c).map(|v| v / BYTES_TO_KB))
        });
        r.source(fs, Some(base.join("io.stat")), IO_BYTES, |c| {
            let (read, write) = parse_io_stat(c);
            vec![("cgroup_io_read", read), ("cgroup_io_write", write)]
        });
        r.source(fs, Some(base.join("cgroup.procs")), &["cgroup_nprocs"], |c| {
            vec![("cgroup_nprocs", count_ids(c))]
        });
        r.source(fs, Some(base.join("cgroup.threads")), &["cgroup_nthreads"], |c| {
            vec![("cgroup_nthreads", count_ids(c))]
        });
        r
    }

    fn read_v1(&self, memberships: &[CgroupMembership], read_root: Option<&Path>) -> Reading {
        let dir = |controller: &str| {
            memberships
                .iter()
                .find(|m| m.controllers.iter().any(|c| c == controller))
                .map(|m| {
                    let mount = rooted(read_root, &self.mount).join(m.controllers.join(","));
                    mount.join(m.path.trim_start_matches('/'))
                })
        };
        let cpuacct = dir("cpuacct");
        let cpu = dir("cpu");
        let memory = dir("memory");
        let blkio = dir("blkio");
        let ticks_to_us = |ticks: u64| ticks * 1_000_000 / self.clock_ticks;

        let fs = &self.fs;
        let mut r = Reading::default();
        r.source(fs, cpuacct.as_ref().map(|d| d.join("cpuacct.stat")), CPU_TIMES, |c| {
            let (user, system) = parse_cpuacct_stat(c);
            let (user, system) = (ticks_to_us(user), ticks_to_us(system));
            vec![
                ("cgroup_cpu_user", user),
                ("cgroup_cpu_system", system),
                ("cgroup_cpu_total", user + system),
            ]
        });
        r.source(fs, cpu.as_ref().map(|d| d.join("cpu.stat")), CPU_THROTTLING, |c| {
            let (periods, throttled) = parse_cpu_stat_v1(c);
            vec![
                ("cgroup_cpu_periods", periods),
                ("cgroup_cpu_throttled", throttled),
            ]
        });
        r.source(fs, memory.as_ref().map(|d| d.join("memory.stat")), MEM_BREAKDOWN, |c| {
            let s = parse_memory_stat_v1(c);
            vec![
                ("cgroup_mem_anon", s.anon / BYTES_TO_KB),
                ("cgroup_mem_file", s.file / BYTES_TO_KB),
                ("cgroup_mem_slab", s.slab / BYTES_TO_KB),
                ("cgroup_mem_pgfault", s.pgfault),
                ("cgroup_mem_pgmajfault", s.pgmajfault),
            ]
        });
        r.source(
            fs,
            memory.as_ref().map(|d| d.join("memory.usage_in_bytes")),
            &["cgroup_mem_current"],
            |c| single("cgroup_mem_current", parse_single_value(c).map(|v| v / BYTES_TO_KB)),
        );
        r.source(
            fs,
            memory.as_ref().map(|d| d.join("memory.limit_in_bytes")),
            &["cgroup_mem_max"],
            |c| single("cgroup_mem_max", parse_memory_max(c).map(|v| v / BYTES_TO_KB)),
        );
        r.source(
            fs,
            blkio.as_ref().map(|d| d.join("blkio.throttle.io_service_bytes")),
            IO_BYTES,
            |c| {
                let (read, write) = parse_blkio_service_bytes(c);
                vec![("cgroup_io_read", read), ("cgroup_io_write", write)]
            },
        );
        r.source(fs, cpu.as_ref().map(|d| d.join("cgroup.procs")), &["cgroup_nprocs"], |c| {
            vec![("cgroup_nprocs", count_ids(c))]
        });
        r.source(fs, cpu.as_ref().map(|d| d.join("tasks")), &["cgroup_nthreads"], |c| {
            vec![("cgroup_nthreads", count_ids(c))]
        });
        r
    }
}

impl<F: FileSystem> Monitor for CgroupMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        let (Some(version), Some(&root_pid)) = (self.version, pids.first()) else {
            return Ok(());
        };
        let memberships = self.memberships(root_pid, read_root)?;

        let reading = match version {
            CgroupVersion::V1 => self.read_v1(&memberships, read_root),
            CgroupVersion::V2 | CgroupVersion::Hybrid => {
                let path = memberships
                    .iter()
                    .find(|m| m.hierarchy_id == 0)
                    .map(|m| m.path.as_str())
                    .unwrap_or("/");
                let base = rooted(read_root, &self.mount).join(path.trim_start_matches('/'));
                self.read_v2(base)
            }
        };

        if reading.values.is_empty() {
            return Err(CollectError::Parse(format!(
                "no readable {} statistics for pid {}",
                version, root_pid
            )));
        }
        if !self.sampled {
            for name in &reading.unavailable {
                if self.values.remove(name) {
                    info!(monitor = NAME, metric = *name, "metric unavailable, not reported");
                }
            }
            self.sampled = true;
        }
        for (name, value) in reading.values {
            self.values.set_masked(name, value);
        }
        Ok(())
    }

    fn text_stats(&self) -> StatMap {
        self.values.text_stats()
    }

    fn json_totals(&self) -> StatMap {
        self.values.totals()
    }

    fn json_averages(&self, elapsed_ticks: u64) -> AverageMap {
        self.values.averages(elapsed_ticks)
    }

    fn parameter_list(&self) -> &'static [Parameter] {
        PARAMS
    }

    fn is_valid(&self) -> bool {
        self.version.is_some()
    }

    fn hardware_info(&self, doc: &mut Value) {
        if let Some(version) = self.version {
            doc["cgroup"]["version"] = Value::from(version.as_str());
            doc["cgroup"]["mount_point"] = Value::from(self.mount.to_string_lossy().into_owned());
        }
    }
}

fn single(name: &'static str, value: Option<u64>) -> Vec<(&'static str, u64)> {
    value.map(|v| vec![(name, v)]).unwrap_or_default()
}
