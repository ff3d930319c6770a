//! GPU probe driven by `nvidia-smi`.
//!
//! Each sample runs `nvidia-smi pmon -s um -c 1` and keeps the rows that
//! belong to the monitored tree. The probe is invalid on hosts where
//! `nvidia-smi -L` fails or lists no GPUs.

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap};
use crate::collector::{CollectError, FileSystem, RealFs, rooted};
use crate::util::{clock_ticks, run_command};

pub const NAME: &str = "nvidiamon";

/// Fixture read in place of `nvidia-smi pmon` output under a read root.
pub const PMON_FIXTURE: &str = "pmon.txt";

const MB_TO_KB: u64 = 1024;

/// Above this many GPUs per-process sampling is known to be unreliable.
const RELIABLE_GPU_LIMIT: u32 = 4;

const PMON_CMD: &[&str] = &["nvidia-smi", "pmon", "-s", "um", "-c", "1"];
const QUERY_CMD: &[&str] = &[
    "nvidia-smi",
    "--query-gpu=clocks.max.sm,memory.total,gpu_name",
    "--format=csv,noheader,nounits",
];

const PARAMS: &[Parameter] = &[
    Parameter::new("ngpus", "1", "1"),
    Parameter::new("gpusmpct", "%", "%"),
    Parameter::new("gpumempct", "%", "%"),
    Parameter::new("gpufbmem", "kB", "kB"),
];

/// Tree-wide GPU usage from one `pmon` sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuUsage {
    /// Distinct GPUs running at least one tree process.
    pub ngpus: u64,
    pub sm_pct: u64,
    pub mem_pct: u64,
    /// Framebuffer memory in kB.
    pub fb_kb: u64,
}

/// Static description of one GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuInfo {
    pub name: String,
    /// Maximum SM clock in MHz.
    pub sm_freq: u64,
    /// Total memory in kB.
    pub total_mem: u64,
}

pub struct NvidiaMonitor<F: FileSystem = RealFs> {
    fs: F,
    values: MonitoredValues,
    gpus: u32,
}

impl NvidiaMonitor<RealFs> {
    /// Probes `nvidia-smi -L` for GPUs.
    pub fn new() -> Self {
        let gpus = match run_command(&["nvidia-smi", "-L"]) {
            Ok(out) => count_gpus(&out.lines),
            Err(e) => {
                debug!(monitor = NAME, error = %e, "nvidia-smi unavailable");
                0
            }
        };
        if gpus == 0 {
            warn!(monitor = NAME, "no usable GPUs found");
        } else if gpus > RELIABLE_GPU_LIMIT {
            warn!(
                monitor = NAME,
                gpus, "more than {} GPUs, process monitoring will be unreliable", RELIABLE_GPU_LIMIT
            );
        }
        Self::with_gpus(RealFs::new(), gpus)
    }
}

impl Default for NvidiaMonitor<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> NvidiaMonitor<F> {
    /// Builds the probe for a known GPU count without invoking
    /// `nvidia-smi -L`.
    pub fn with_gpus(fs: F, gpus: u32) -> Self {
        Self {
            fs,
            values: MonitoredValues::new(PARAMS, false, clock_ticks()),
            gpus,
        }
    }

    fn pmon_lines(&self, read_root: Option<&Path>) -> Result<Vec<String>, CollectError> {
        match read_root {
            Some(root) => {
                let content = self.fs.read_to_string(&rooted(Some(root), PMON_FIXTURE))?;
                Ok(content.lines().map(str::to_string).collect())
            }
            None => Ok(run_command(PMON_CMD)?.lines),
        }
    }
}

impl<F: FileSystem> Monitor for NvidiaMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        let lines = self.pmon_lines(read_root)?;
        let usage = parse_pmon(&lines, pids);
        debug!(monitor = NAME, rows = lines.len(), ?usage, "pmon sampled");

        self.values.set_masked("ngpus", usage.ngpus);
        self.values.set_masked("gpusmpct", usage.sm_pct);
        self.values.set_masked("gpumempct", usage.mem_pct);
        self.values.set_masked("gpufbmem", usage.fb_kb);
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
        self.gpus > 0
    }

    fn hardware_info(&self, doc: &mut Value) {
        doc["HW"]["gpu"]["nGPU"] = Value::from(self.gpus);
        let lines = match run_command(QUERY_CMD) {
            Ok(out) => out.lines,
            Err(e) => {
                error!(monitor = NAME, error = %e, "failed to get GPU hardware details");
                return;
            }
        };
        for (idx, gpu) in parse_gpu_query(&lines).into_iter().enumerate() {
            if let Some(gpu) = gpu {
                let key = format!("gpu_{}", idx);
                doc["HW"]["gpu"][&key]["name"] = Value::from(gpu.name);
                doc["HW"]["gpu"][&key]["sm_freq"] = Value::from(gpu.sm_freq);
                doc["HW"]["gpu"][&key]["total_mem"] = Value::from(gpu.total_mem);
            }
        }
    }
}

/// Counts the `GPU n: ...` lines of `nvidia-smi -L`.
pub fn count_gpus(lines: &[String]) -> u32 {
    lines.iter().filter(|l| l.starts_with("GPU")).count() as u32
}

/// Sums `nvidia-smi pmon` rows whose PID is in `pids`.
///
/// The `fb` column is located from the `# gpu pid ...` header when present;
/// without one the current layout
/// (`gpu pid type sm mem enc dec jpg ofa fb ccpm command`) is assumed.
/// Idle placeholders (`-`) count as zero and malformed rows are skipped.
pub fn parse_pmon(lines: &[String], pids: &[u32]) -> GpuUsage {
    let pids: HashSet<u32> = pids.iter().copied().collect();
    let mut fb_col = 9;
    let mut active = HashSet::new();
    let mut usage = GpuUsage::default();

    for line in lines {
        if let Some(header) = line.strip_prefix('#') {
            let cols: Vec<&str> = header.split_whitespace().collect();
            if cols.contains(&"pid") {
                if let Some(pos) = cols.iter().position(|c| *c == "fb") {
                    fb_col = pos;
                }
            }
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() <= fb_col {
            continue;
        }
        let (Ok(gpu), Ok(pid)) = (fields[0].parse::<u32>(), fields[1].parse::<u32>()) else {
            continue;
        };
        if !pids.contains(&pid) {
            continue;
        }
        let column = |i: usize| {
            fields
                .get(i)
                .and_then(|f| f.parse::<u64>().ok())
                .unwrap_or(0)
        };

        usage.sm_pct += column(3);
        usage.mem_pct += column(4);
        usage.fb_kb += column(fb_col) * MB_TO_KB;
        if active.insert(gpu) {
            usage.ngpus += 1;
        }
    }
    usage
}

/// Parses `--query-gpu=clocks.max.sm,memory.total,gpu_name` CSV rows.
///
/// Keeps one entry per line so GPU numbering follows the tool's order;
/// unparseable lines yield `None`.
pub fn parse_gpu_query(lines: &[String]) -> Vec<Option<GpuInfo>> {
    lines
        .iter()
        .map(|line| {
            let mut parts = line.splitn(3, ',').map(str::trim);
            let sm_freq = parts.next()?.parse().ok()?;
            let total_mb: u64 = parts.next()?.parse().ok()?;
            let name = parts.next().filter(|n| !n.is_empty()).unwrap_or("unknown");
            Some(GpuInfo {
                name: name.to_string(),
                sm_freq,
                total_mem: total_mb * MB_TO_KB,
            })
        })
        .inspect(|gpu| {
            if gpu.is_none() {
                warn!(monitor = NAME, "unexpected line from GPU hardware query");
            }
        })
        .collect()
}
