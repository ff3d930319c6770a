//! Process and thread count probe.

use std::path::Path;

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap, read_per_pid};
use crate::collector::procfs::parse_proc_stat;
use crate::collector::{CollectError, FileSystem, RealFs};
use crate::util::clock_ticks;

pub const NAME: &str = "countmon";

const PARAMS: &[Parameter] = &[
    Parameter::new("nprocs", "1", "1"),
    Parameter::new("nthreads", "1", "1"),
];

pub struct CountMonitor<F: FileSystem = RealFs> {
    fs: F,
    values: MonitoredValues,
}

impl CountMonitor<RealFs> {
    pub fn new() -> Self {
        Self::with_fs(RealFs::new())
    }
}

impl Default for CountMonitor<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> CountMonitor<F> {
    pub fn with_fs(fs: F) -> Self {
        Self {
            fs,
            values: MonitoredValues::new(PARAMS, false, clock_ticks()),
        }
    }
}

impl<F: FileSystem> Monitor for CountMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        // Only processes whose stat is still readable are counted.
        let threads = read_per_pid(&self.fs, NAME, pids, read_root, "stat", |c| {
            Ok(parse_proc_stat(c)?.num_threads)
        })?;
        self.values.set_masked("nprocs", threads.len() as u64);
        self.values.set_masked("nthreads", threads.iter().sum());
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_countmon_counts_tree() {
        let mut mon = CountMonitor::with_fs(MockFs::process_tree());
        mon.update(&[1729, 1730, 1731, 1732], None).unwrap();
        assert_eq!(mon.text_stats(), vec![("nprocs", 4), ("nthreads", 8)]);

        mon.update(&[1729, 1731], None).unwrap();
        assert_eq!(mon.text_stats(), vec![("nprocs", 2), ("nthreads", 3)]);
        assert_eq!(mon.json_totals(), vec![("nprocs", 4), ("nthreads", 8)]);
        assert_eq!(
            mon.json_averages(100),
            vec![("nprocs", 3.0), ("nthreads", 5.5)]
        );
    }
}
