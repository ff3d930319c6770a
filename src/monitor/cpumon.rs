//! CPU time probe: user and system seconds consumed by the tree.
//!
//! Reaped children are included through `cutime`/`cstime`, so the totals
//! keep growing after short-lived workers exit.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap, read_per_pid};
use crate::collector::procfs::{CpuTopology, parse_cpuinfo, parse_proc_stat};
use crate::collector::{CollectError, FileSystem, RealFs};
use crate::util::{clock_ticks, run_command};

pub const NAME: &str = "cpumon";

const PARAMS: &[Parameter] = &[
    Parameter::new("utime", "s", ""),
    Parameter::new("stime", "s", ""),
];

/// `lscpu` keys and the names they are published under.
const LSCPU_KEYS: &[(&str, &str)] = &[
    ("Model name", "ModelName"),
    ("CPU(s)", "CPUs"),
    ("Socket(s)", "Sockets"),
    ("Core(s) per socket", "CoresPerSocket"),
    ("Thread(s) per core", "ThreadsPerCore"),
];

pub struct CpuMonitor<F: FileSystem = RealFs> {
    fs: F,
    values: MonitoredValues,
    clock_ticks: u64,
}

impl CpuMonitor<RealFs> {
    pub fn new() -> Self {
        Self::with_fs(RealFs::new())
    }
}

impl Default for CpuMonitor<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> CpuMonitor<F> {
    pub fn with_fs(fs: F) -> Self {
        let clock_ticks = clock_ticks();
        Self {
            fs,
            values: MonitoredValues::new(PARAMS, true, clock_ticks),
            clock_ticks,
        }
    }
}

impl<F: FileSystem> Monitor for CpuMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        let stats = read_per_pid(&self.fs, NAME, pids, read_root, "stat", |c| {
            parse_proc_stat(c).map_err(CollectError::from)
        })?;
        let utime: u64 = stats.iter().map(|s| s.utime + s.cutime).sum();
        let stime: u64 = stats.iter().map(|s| s.stime + s.cstime).sum();

        self.values.set_masked("utime", utime / self.clock_ticks);
        self.values.set_masked("stime", stime / self.clock_ticks);
        Ok(())
    }

    fn text_stats(&self) -> StatMap {
        self.values.text_stats()
    }

    fn json_totals(&self) -> StatMap {
        self.values.totals()
    }

    fn json_averages(&self, _elapsed_ticks: u64) -> AverageMap {
        AverageMap::new()
    }

    fn parameter_list(&self) -> &'static [Parameter] {
        PARAMS
    }

    fn hardware_info(&self, doc: &mut Value) {
        let cpu = match run_command(&["lscpu"]) {
            Ok(out) => cpu_info_from_lscpu(&out.lines),
            Err(e) => {
                debug!(monitor = NAME, error = %e, "lscpu unavailable");
                Map::new()
            }
        };
        let cpu = if cpu.is_empty() {
            match self
                .fs
                .read_to_string(Path::new("/proc/cpuinfo"))
                .map_err(CollectError::from)
                .and_then(|c| parse_cpuinfo(&c).map_err(CollectError::from))
            {
                Ok(topo) => cpu_info_from_topology(&topo),
                Err(e) => {
                    warn!(monitor = NAME, error = %e, "no CPU hardware information");
                    return;
                }
            }
        } else {
            cpu
        };
        doc["HW"]["cpu"] = Value::Object(cpu);
    }
}

/// Picks the published keys out of `lscpu` output.
///
/// Purely numeric values are emitted as numbers.
pub fn cpu_info_from_lscpu(lines: &[String]) -> Map<String, Value> {
    let mut cpu = Map::new();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if value.is_empty() {
            continue;
        }
        let Some(&(_, published)) = LSCPU_KEYS.iter().find(|(k, _)| *k == key) else {
            continue;
        };
        let value = match value.parse::<u64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(value),
        };
        cpu.insert(published.to_string(), value);
    }
    cpu
}

fn cpu_info_from_topology(topo: &CpuTopology) -> Map<String, Value> {
    let mut cpu = Map::new();
    cpu.insert("ModelName".into(), Value::from(topo.model_name.clone()));
    cpu.insert("CPUs".into(), Value::from(topo.cpus));
    cpu.insert("Sockets".into(), Value::from(topo.sockets));
    cpu.insert("CoresPerSocket".into(), Value::from(topo.cores_per_socket));
    cpu.insert("ThreadsPerCore".into(), Value::from(topo.threads_per_core));
    cpu
}
