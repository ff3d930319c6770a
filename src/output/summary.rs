//! Assembly of the JSON summary document.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::monitor::Monitor;
use crate::util::round2;

/// One summary document, as written to the snapshot and final files.
///
/// Metadata sections (`HW`, `Units`, `cgroup`) are flattened after `Max`
/// and `Avg`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryDoc {
    #[serde(rename = "Max")]
    pub max: Map<String, Value>,
    #[serde(rename = "Avg")]
    pub avg: Map<String, Value>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Builds the summary document from the active probes.
///
/// Hardware and unit metadata are gathered once and then attached to
/// every document after the `Max` and `Avg` sections.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    metadata: Value,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects one-shot metadata from every probe.
    pub fn collect_metadata(&mut self, monitors: &[Box<dyn Monitor>], hardware: bool, units: bool) {
        for monitor in monitors {
            if hardware {
                monitor.hardware_info(&mut self.metadata);
            }
            if units {
                monitor.unit_info(&mut self.metadata);
            }
        }
    }

    /// Builds the document with keys in probe then parameter order and
    /// averages rounded to two decimals.
    pub fn build(&self, monitors: &[Box<dyn Monitor>], elapsed_ticks: u64) -> SummaryDoc {
        let mut doc = SummaryDoc::default();
        for monitor in monitors {
            for (name, value) in monitor.json_totals() {
                doc.max.insert(name.to_string(), Value::from(value));
            }
            for (name, value) in monitor.json_averages(elapsed_ticks) {
                doc.avg.insert(name.to_string(), Value::from(round2(value)));
            }
        }
        if let Value::Object(metadata) = &self.metadata {
            doc.metadata = metadata.clone();
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::monitor::countmon::CountMonitor;
    use crate::monitor::memmon::MemMonitor;

    fn monitors() -> Vec<Box<dyn Monitor>> {
        let pids = [1729, 1730, 1731, 1732];
        let mut count = CountMonitor::with_fs(MockFs::process_tree());
        let mut mem = MemMonitor::with_fs(MockFs::process_tree());
        count.update(&pids, None).unwrap();
        count.update(&pids[..1], None).unwrap();
        mem.update(&pids, None).unwrap();
        vec![Box::new(count), Box::new(mem)]
    }

    #[test]
    fn test_summary_order_and_rounding() {
        let monitors = monitors();
        let doc = serde_json::to_value(Summary::new().build(&monitors, 100)).unwrap();

        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["Max", "Avg"]);
        let max: Vec<&String> = doc["Max"].as_object().unwrap().keys().collect();
        assert_eq!(
            max,
            ["nprocs", "nthreads", "vmem", "pss", "rss", "swap"]
        );
        assert_eq!(doc["Max"]["nthreads"], 8);
        // (8 + 1) / 2
        assert_eq!(doc["Avg"]["nthreads"], 4.5);
        assert_eq!(doc["Avg"]["rss"], 8000.0);
    }

    #[test]
    fn test_summary_metadata() {
        let monitors = monitors();
        let mut summary = Summary::new();
        summary.collect_metadata(&monitors, true, true);
        let doc = serde_json::to_value(summary.build(&monitors, 100)).unwrap();

        assert_eq!(doc["HW"]["mem"]["MemTotal"], 16384000);
        assert_eq!(doc["Units"]["Max"]["rss"], "kB");
        assert_eq!(doc["Units"]["Avg"]["nprocs"], "1");

        let mut bare = Summary::new();
        bare.collect_metadata(&monitors, false, false);
        let doc = bare.build(&monitors, 100);
        assert!(doc.metadata.is_empty());
        let text = serde_json::to_string(&doc).unwrap();
        assert!(text.starts_with("{\"Max\":{"));
        assert!(!text.contains("Units"));
    }
}
