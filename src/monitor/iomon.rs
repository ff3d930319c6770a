//! I/O probe: bytes read and written by the tree, from `/proc/<pid>/io`.

use std::path::Path;

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap, read_per_pid};
use crate::collector::procfs::parse_proc_io;
use crate::collector::{CollectError, FileSystem, RealFs};
use crate::util::clock_ticks;

pub const NAME: &str = "iomon";

const PARAMS: &[Parameter] = &[
    Parameter::new("rchar", "B", "B/s"),
    Parameter::new("wchar", "B", "B/s"),
    Parameter::new("read_bytes", "B", "B/s"),
    Parameter::new("write_bytes", "B", "B/s"),
];

/// Sums the cumulative I/O counters of every process in the tree.
///
/// Counters are monotonic; a sum that shrinks because a process exited
/// without being reaped into its parent keeps the previous peak.
pub struct IoMonitor<F: FileSystem = RealFs> {
    fs: F,
    values: MonitoredValues,
}

impl IoMonitor<RealFs> {
    pub fn new() -> Self {
        Self::with_fs(RealFs::new())
    }
}

impl Default for IoMonitor<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> IoMonitor<F> {
    pub fn with_fs(fs: F) -> Self {
        Self {
            fs,
            values: MonitoredValues::new(PARAMS, true, clock_ticks()),
        }
    }
}

impl<F: FileSystem> Monitor for IoMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        let ios = read_per_pid(&self.fs, NAME, pids, read_root, "io", |c| {
            parse_proc_io(c).map_err(CollectError::from)
        })?;

        let mut totals = [0u64; 4];
        for io in &ios {
            totals[0] += io.rchar;
            totals[1] += io.wchar;
            totals[2] += io.read_bytes;
            totals[3] += io.write_bytes;
        }
        for (param, total) in PARAMS.iter().zip(totals) {
            self.values.set_masked(param.name(), total);
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_iomon_drop_is_masked() {
        let mut mon = IoMonitor::with_fs(MockFs::counter_drop());
        let mut rchar = Vec::new();
        for step in 1..=3 {
            let root = format!("/fixture/drop/{}", step);
            mon.update(&[1729], Some(Path::new(&root))).unwrap();
            rchar.push(mon.text_stats()[0].1);
        }
        assert_eq!(rchar, vec![500, 1000, 1000]);
        assert_eq!(
            mon.json_totals(),
            vec![
                ("rchar", 1000),
                ("wchar", 2000),
                ("read_bytes", 2000),
                ("write_bytes", 2000),
            ]
        );
    }

    #[test]
    fn test_iomon_tree_and_rates() {
        let mut mon = IoMonitor::with_fs(MockFs::process_tree());
        mon.update(&[1729, 1730, 1731, 1732], None).unwrap();
        assert_eq!(
            mon.text_stats(),
            vec![
                ("rchar", 4000),
                ("wchar", 2000),
                ("read_bytes", 16384),
                ("write_bytes", 8192),
            ]
        );

        // Ten seconds of wall clock.
        let averages = mon.json_averages(10 * clock_ticks());
        assert_eq!(averages[0], ("rchar", 400.0));
        assert_eq!(averages.len(), PARAMS.len());
    }

    #[test]
    fn test_iomon_reports_declared_parameters() {
        let mut mon = IoMonitor::with_fs(MockFs::process_tree());
        mon.update(&[1729], None).unwrap();
        let declared: Vec<&str> = mon.parameter_list().iter().map(|p| p.name()).collect();
        let text: Vec<&str> = mon.text_stats().iter().map(|(k, _)| *k).collect();
        let totals: Vec<&str> = mon.json_totals().iter().map(|(k, _)| *k).collect();
        assert_eq!(text, declared);
        assert_eq!(totals, declared);
    }
}
