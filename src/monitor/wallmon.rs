//! Wall-clock probe: elapsed time since the root process started.
//!
//! This is the only source of elapsed time for rate averages, so the
//! orchestrator refuses to run without it.

use std::path::Path;

use tracing::debug;

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap};
use crate::collector::procfs::{parse_proc_stat, parse_uptime};
use crate::collector::{CollectError, FileSystem, RealFs, rooted};
use crate::util::clock_ticks;

pub const NAME: &str = "wallmon";

const PARAMS: &[Parameter] = &[Parameter::new("wtime", "s", "")];

pub struct WallMonitor<F: FileSystem = RealFs> {
    fs: F,
    values: MonitoredValues,
    clock_ticks: u64,
    /// Root process start, in ticks since boot. Read once.
    start_ticks: Option<u64>,
    elapsed_ticks: u64,
}

impl WallMonitor<RealFs> {
    pub fn new() -> Self {
        Self::with_fs(RealFs::new())
    }
}

impl Default for WallMonitor<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> WallMonitor<F> {
    pub fn with_fs(fs: F) -> Self {
        let clock_ticks = clock_ticks();
        Self {
            fs,
            values: MonitoredValues::new(PARAMS, true, clock_ticks),
            clock_ticks,
            start_ticks: None,
            elapsed_ticks: 0,
        }
    }

    fn root_start_ticks(
        &mut self,
        root_pid: u32,
        read_root: Option<&Path>,
    ) -> Result<u64, CollectError> {
        if let Some(ticks) = self.start_ticks {
            return Ok(ticks);
        }
        let path = rooted(read_root, format!("/proc/{}/stat", root_pid));
        let stat = parse_proc_stat(&self.fs.read_to_string(&path)?)?;
        debug!(
            monitor = NAME,
            pid = root_pid,
            starttime = stat.starttime,
            "root start time"
        );
        self.start_ticks = Some(stat.starttime);
        Ok(stat.starttime)
    }
}

impl<F: FileSystem> Monitor for WallMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        let Some(&root_pid) = pids.first() else {
            return Ok(());
        };
        let start = self.root_start_ticks(root_pid, read_root)?;

        let uptime = parse_uptime(&self.fs.read_to_string(&rooted(read_root, "/proc/uptime"))?)?;
        let now_ticks = (uptime * self.clock_ticks as f64) as u64;
        self.elapsed_ticks = now_ticks.saturating_sub(start);
        self.values
            .set_masked("wtime", self.elapsed_ticks / self.clock_ticks);
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

    /// Never zero, so it can safely divide.
    fn wallclock_ticks(&self) -> Option<u64> {
        Some(self.elapsed_ticks.max(1))
    }
}
