//! Resource probes and the contract they share.
//!
//! Every probe implements [`Monitor`]. The orchestrator only sees
//! `Box<dyn Monitor>` values produced by the [`Registry`], so a new probe
//! is added by writing a module here and registering it in
//! [`Registry::with_builtin`].
//!
//! Output maps are ordered vectors rather than hash maps: the JSON summary
//! and the text log list keys in probe-then-parameter declaration order.

pub mod cgroupmon;
pub mod countmon;
pub mod cpumon;
pub mod iomon;
pub mod memmon;
pub mod netmon;
pub mod nvidiamon;
pub mod parameter;
pub mod registry;
pub mod wallmon;

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::collector::{CollectError, FileSystem, rooted};

pub use parameter::{MonitoredValue, Parameter, ValueError};
pub use registry::{Constructor, Registry};

/// Current or peak values keyed by parameter name, in declaration order.
pub type StatMap = Vec<(&'static str, u64)>;

/// Averages or rates keyed by parameter name, in declaration order.
pub type AverageMap = Vec<(&'static str, f64)>;

/// Capability contract every resource probe implements.
pub trait Monitor: Send {
    /// Registry name, e.g. `"iomon"`.
    fn name(&self) -> &'static str;

    /// Resamples this probe's metrics for the given process set.
    ///
    /// `read_root` re-anchors every `/proc` and `/sys` read below a fixture
    /// directory; production callers pass `None`. On error the previous
    /// values are retained.
    fn update(&mut self, pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError>;

    /// Current values for the tabular log.
    fn text_stats(&self) -> StatMap;

    /// Peak (or total, for counters) values for the summary's `Max` section.
    fn json_totals(&self) -> StatMap;

    /// Averages and rates for the summary's `Avg` section.
    fn json_averages(&self, elapsed_ticks: u64) -> AverageMap;

    /// The static schema of this probe.
    fn parameter_list(&self) -> &'static [Parameter];

    /// Adds one-shot host metadata to the summary document.
    fn hardware_info(&self, _doc: &mut Value) {}

    /// Adds this probe's units to the summary document.
    fn unit_info(&self, doc: &mut Value) {
        fill_units(doc, self.parameter_list());
    }

    /// Construction-time self check; invalid probes are left out of the
    /// active set.
    fn is_valid(&self) -> bool {
        true
    }

    /// Elapsed clock ticks of the monitored tree, if this probe tracks it.
    fn wallclock_ticks(&self) -> Option<u64> {
        None
    }
}

/// Writes `Units.Max.<name>` and `Units.Avg.<name>` for every non-empty unit.
pub fn fill_units(doc: &mut Value, params: &[Parameter]) {
    for param in params {
        if !param.max_unit().is_empty() {
            doc["Units"]["Max"][param.name()] = Value::from(param.max_unit());
        }
        if !param.avg_unit().is_empty() {
            doc["Units"]["Avg"][param.name()] = Value::from(param.avg_unit());
        }
    }
}

/// Reads and parses `/proc/<pid>/<file>` for every PID.
///
/// Processes that exited since discovery are skipped. Fails only when no
/// PID could be read at all, so the caller keeps its previous values.
pub(crate) fn read_per_pid<F, T, P>(
    fs: &F,
    monitor: &'static str,
    pids: &[u32],
    read_root: Option<&Path>,
    file: &str,
    parse: P,
) -> Result<Vec<T>, CollectError>
where
    F: FileSystem,
    P: Fn(&str) -> Result<T, CollectError>,
{
    let mut parsed = Vec::with_capacity(pids.len());
    let mut last_err = None;

    for &pid in pids {
        let path = rooted(read_root, format!("/proc/{}/{}", pid, file));
        match fs
            .read_to_string(&path)
            .map_err(CollectError::from)
            .and_then(|content| parse(&content))
        {
            Ok(value) => parsed.push(value),
            Err(e) => {
                debug!(monitor, pid, file, error = %e, "skipping process");
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) if parsed.is_empty() => Err(e),
        _ => Ok(parsed),
    }
}

/// Ordered collection of the values a probe owns.
///
/// Wraps the per-parameter [`MonitoredValue`]s and derives the three output
/// maps from them, so individual probes only decide what to feed in.
#[derive(Debug, Clone)]
pub struct MonitoredValues {
    values: Vec<MonitoredValue>,
    clock_ticks: u64,
}

impl MonitoredValues {
    /// Builds one value per parameter, all with the same monotonicity.
    pub fn new(params: &[Parameter], monotonic: bool, clock_ticks: u64) -> Self {
        Self {
            values: params
                .iter()
                .map(|p| MonitoredValue::new(p.clone(), monotonic, 0))
                .collect(),
            clock_ticks,
        }
    }

    pub fn get(&self, name: &str) -> Option<&MonitoredValue> {
        self.values.iter().find(|v| v.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MonitoredValue> {
        self.values.iter_mut().find(|v| v.name() == name)
    }

    /// Feeds a raw reading to the named value, masking drops.
    ///
    /// Unknown names (values removed at runtime) are ignored.
    pub fn set_masked(&mut self, name: &str, raw: u64) {
        if let Some(value) = self.get_mut(name) {
            value.set_masked(raw);
        }
    }

    /// Drops a value that the host cannot provide.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.values.len();
        self.values.retain(|v| v.name() != name);
        self.values.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitoredValue> {
        self.values.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MonitoredValue> {
        self.values.iter_mut()
    }

    pub fn text_stats(&self) -> StatMap {
        self.values.iter().map(|v| (v.name(), v.get())).collect()
    }

    pub fn totals(&self) -> StatMap {
        self.values.iter().map(|v| (v.name(), v.peak())).collect()
    }

    /// Averages for every value with an average unit.
    ///
    /// Rate parameters (`…/s`) report `peak / elapsed seconds`; all others
    /// report the running mean.
    pub fn averages(&self, elapsed_ticks: u64) -> AverageMap {
        self.values
            .iter()
            .filter(|v| !v.parameter().avg_unit().is_empty())
            .map(|v| {
                let avg = if v.parameter().is_rate() {
                    if elapsed_ticks == 0 {
                        0.0
                    } else {
                        v.peak() as f64 * self.clock_ticks as f64 / elapsed_ticks as f64
                    }
                } else {
                    v.average()
                };
                (v.name(), avg)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &[Parameter] = &[
        Parameter::new("rchar", "B", "B/s"),
        Parameter::new("wtime", "s", ""),
        Parameter::new("rss", "kB", "kB"),
    ];

    #[test]
    fn test_fill_units_skips_empty() {
        let mut doc = Value::Null;
        fill_units(&mut doc, PARAMS);
        assert_eq!(doc["Units"]["Max"]["rchar"], "B");
        assert_eq!(doc["Units"]["Max"]["wtime"], "s");
        assert_eq!(doc["Units"]["Avg"]["rchar"], "B/s");
        assert!(doc["Units"]["Avg"].get("wtime").is_none());
    }

    #[test]
    fn test_values_output_order_and_averages() {
        let mut values = MonitoredValues::new(PARAMS, false, 100);
        values.set_masked("rchar", 1000);
        values.set_masked("rss", 10);
        values.set_masked("rss", 30);

        assert_eq!(
            values.text_stats(),
            vec![("rchar", 1000), ("wtime", 0), ("rss", 30)]
        );
        // 1000 B over 500 ticks at 100 ticks/s = 200 B/s
        assert_eq!(values.averages(500), vec![("rchar", 200.0), ("rss", 20.0)]);
        assert_eq!(values.averages(0)[0], ("rchar", 0.0));
    }

    #[test]
    fn test_read_per_pid_skips_vanished() {
        let mut fs = crate::collector::MockFs::new();
        fs.add_file("/proc/1/io", "7");
        fs.add_file("/fixture/proc/1/io", "9");
        let parse = |c: &str| {
            c.trim()
                .parse::<u64>()
                .map_err(|e| CollectError::Parse(e.to_string()))
        };

        let got = read_per_pid(&fs, "test", &[1, 2], None, "io", parse).unwrap();
        assert_eq!(got, vec![7]);
        let got = read_per_pid(&fs, "test", &[1], Some(Path::new("/fixture")), "io", parse);
        assert_eq!(got.unwrap(), vec![9]);
        assert!(read_per_pid(&fs, "test", &[2], None, "io", parse).is_err());
        assert!(read_per_pid(&fs, "test", &[], None, "io", parse).unwrap().is_empty());
    }

    #[test]
    fn test_values_remove() {
        let mut values = MonitoredValues::new(PARAMS, true, 100);
        assert!(values.remove("wtime"));
        assert!(!values.remove("wtime"));
        values.set_masked("wtime", 5);
        assert_eq!(values.totals(), vec![("rchar", 0), ("rss", 0)]);
    }
}
