//! Memory probe: virtual, proportional, resident and swapped memory of
//! the tree, in kB.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap, read_per_pid};
use crate::collector::procfs::{
    SmapsTotals, parse_meminfo_total, parse_smaps, parse_status_vmsize,
};
use crate::collector::{CollectError, FileSystem, RealFs, rooted};
use crate::util::clock_ticks;

pub const NAME: &str = "memmon";

const PARAMS: &[Parameter] = &[
    Parameter::new("vmem", "kB", "kB"),
    Parameter::new("pss", "kB", "kB"),
    Parameter::new("rss", "kB", "kB"),
    Parameter::new("swap", "kB", "kB"),
];

/// Reads `smaps_rollup` where the kernel provides it (4.14+), which is
/// much cheaper than walking every mapping in `smaps`. The rollup has no
/// `Size` lines, so `vmem` then comes from `VmSize` in `status`.
pub struct MemMonitor<F: FileSystem = RealFs> {
    fs: F,
    values: MonitoredValues,
    /// Decided on the first update.
    use_rollup: Option<bool>,
}

impl MemMonitor<RealFs> {
    pub fn new() -> Self {
        Self::with_fs(RealFs::new())
    }
}

impl Default for MemMonitor<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> MemMonitor<F> {
    pub fn with_fs(fs: F) -> Self {
        Self {
            fs,
            values: MonitoredValues::new(PARAMS, false, clock_ticks()),
            use_rollup: None,
        }
    }

    fn read_totals(
        &self,
        pids: &[u32],
        read_root: Option<&Path>,
        rollup: bool,
    ) -> Result<SmapsTotals, CollectError> {
        let file = if rollup { "smaps_rollup" } else { "smaps" };
        let maps = read_per_pid(&self.fs, NAME, pids, read_root, file, |c| {
            Ok(parse_smaps(c))
        })?;

        let mut totals = SmapsTotals::default();
        for m in &maps {
            totals.size += m.size;
            totals.rss += m.rss;
            totals.pss += m.pss;
            totals.swap += m.swap;
        }

        if rollup {
            let sizes = read_per_pid(&self.fs, NAME, pids, read_root, "status", |c| {
                Ok(parse_status_vmsize(c).unwrap_or(0))
            })?;
            totals.size = sizes.iter().sum();
        }
        Ok(totals)
    }
}

impl<F: FileSystem> Monitor for MemMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        let Some(&root_pid) = pids.first() else {
            return Ok(());
        };
        let rollup = match self.use_rollup {
            Some(rollup) => rollup,
            None => {
                let probe = rooted(read_root, format!("/proc/{}/smaps_rollup", root_pid));
                let available = self.fs.exists(&probe);
                debug!(monitor = NAME, smaps_rollup = available, "memory source selected");
                self.use_rollup = Some(available);
                available
            }
        };

        let totals = self.read_totals(pids, read_root, rollup)?;
        self.values.set_masked("vmem", totals.size);
        self.values.set_masked("pss", totals.pss);
        self.values.set_masked("rss", totals.rss);
        self.values.set_masked("swap", totals.swap);
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

    fn hardware_info(&self, doc: &mut Value) {
        match self
            .fs
            .read_to_string(Path::new("/proc/meminfo"))
            .map_err(CollectError::from)
            .and_then(|c| parse_meminfo_total(&c).map_err(CollectError::from))
        {
            Ok(total) => doc["HW"]["mem"]["MemTotal"] = Value::from(total),
            Err(e) => warn!(monitor = NAME, error = %e, "no memory hardware information"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    const SMAPS: &str = "\
00400000-00452000 r-xp 00000000 08:02 173521      /usr/bin/job
Size:                300 kB
Rss:                 200 kB
Pss:                 100 kB
Swap:                 10 kB
";

    #[test]
    fn test_memmon_uses_rollup_and_status() {
        let mut mon = MemMonitor::with_fs(MockFs::process_tree());
        mon.update(&[1729, 1730, 1731, 1732], None).unwrap();
        assert_eq!(
            mon.text_stats(),
            vec![("vmem", 40000), ("pss", 6000), ("rss", 8000), ("swap", 400)]
        );
    }

    #[test]
    fn test_memmon_falls_back_to_smaps() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/20/smaps", SMAPS);
        fs.add_file("/proc/21/smaps", SMAPS);
        let mut mon = MemMonitor::with_fs(fs);
        mon.update(&[20, 21], None).unwrap();
        assert_eq!(
            mon.text_stats(),
            vec![("vmem", 600), ("pss", 200), ("rss", 400), ("swap", 20)]
        );
    }

    #[test]
    fn test_memmon_peak_and_average() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/20/smaps", SMAPS);
        fs.add_file("/proc/21/smaps", SMAPS);
        let mut mon = MemMonitor::with_fs(fs);
        mon.update(&[20, 21], None).unwrap();
        mon.update(&[20, 21], None).unwrap();
        // 21 exited before the third sample.
        mon.update(&[20], None).unwrap();

        let totals = mon.json_totals();
        assert_eq!(totals[2], ("rss", 400));
        assert_eq!(mon.text_stats()[2], ("rss", 200));
        let averages = mon.json_averages(100);
        // (400 + 400 + 200) / 3
        assert!((averages[2].1 - 1000.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_memmon_hardware_info() {
        let mon = MemMonitor::with_fs(MockFs::process_tree());
        let mut doc = Value::Null;
        mon.hardware_info(&mut doc);
        assert_eq!(doc["HW"]["mem"]["MemTotal"], 16384000);
    }
}
