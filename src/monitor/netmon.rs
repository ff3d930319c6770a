//! Network probe: device-level traffic counters from
//! `/sys/class/net/<dev>/statistics`.
//!
//! The counters are host-wide rather than per process, so they are
//! reported relative to the values seen when the probe was constructed.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{AverageMap, Monitor, MonitoredValues, Parameter, StatMap};
use crate::collector::{CollectError, FileSystem, ReadSeek, RealFs, rooted};
use crate::util::clock_ticks;

pub const NAME: &str = "netmon";

/// Where the kernel publishes per-device statistics.
pub const NET_CLASS_PATH: &str = "/sys/class/net";

const PARAMS: &[Parameter] = &[
    Parameter::new("rx_bytes", "B", "B/s"),
    Parameter::new("rx_packets", "1", "1/s"),
    Parameter::new("tx_bytes", "B", "B/s"),
    Parameter::new("tx_packets", "1", "1/s"),
];

/// An open statistics file for one (parameter, device) pair.
struct CounterHandle {
    param: usize,
    device: String,
    reader: Box<dyn ReadSeek>,
}

impl CounterHandle {
    fn read(&mut self) -> Result<u64, CollectError> {
        self.reader.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        self.reader.read_to_string(&mut content)?;
        parse_counter(&content)
    }
}

/// Sums device counters over the watched devices.
///
/// One reader per (parameter, device) is opened at construction and kept
/// for the lifetime of the probe; every sample rewinds and re-reads it.
/// The handles are closed when the probe is dropped.
pub struct NetMonitor<F: FileSystem = RealFs> {
    fs: F,
    devices: Vec<String>,
    net_path: PathBuf,
    handles: Vec<CounterHandle>,
    values: MonitoredValues,
}

impl NetMonitor<RealFs> {
    /// Watches `devices`, or every device under `/sys/class/net` when the
    /// list is empty.
    pub fn new(devices: &[String]) -> Self {
        Self::with_fs(RealFs::new(), devices)
    }
}

impl<F: FileSystem> NetMonitor<F> {
    pub fn with_fs(fs: F, devices: &[String]) -> Self {
        Self::with_net_path(fs, devices, NET_CLASS_PATH)
    }

    pub fn with_net_path(fs: F, devices: &[String], net_path: impl Into<PathBuf>) -> Self {
        let net_path = net_path.into();
        let devices = if devices.is_empty() {
            list_devices(&fs, &net_path)
        } else {
            devices.to_vec()
        };

        let mut handles = Vec::with_capacity(PARAMS.len() * devices.len());
        for (param, p) in PARAMS.iter().enumerate() {
            for device in &devices {
                let path = counter_path(&net_path, device, p.name());
                match fs.open_reader(&path) {
                    Ok(reader) => handles.push(CounterHandle {
                        param,
                        device: device.clone(),
                        reader,
                    }),
                    Err(e) => {
                        warn!(monitor = NAME, path = %path.display(), error = %e, "cannot open counter")
                    }
                }
            }
        }

        let mut mon = Self {
            fs,
            devices,
            net_path,
            handles,
            values: MonitoredValues::new(PARAMS, true, clock_ticks()),
        };
        mon.apply_start_offsets();
        mon
    }

    /// Devices being watched.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    fn apply_start_offsets(&mut self) {
        let mut start = [0u64; PARAMS.len()];
        for handle in &mut self.handles {
            match handle.read() {
                Ok(value) => start[handle.param] += value,
                Err(e) => warn!(
                    monitor = NAME,
                    device = %handle.device,
                    error = %e,
                    "cannot read initial counter"
                ),
            }
        }
        for (value, offset) in self.values.iter_mut().zip(start) {
            if let Err(e) = value.set_offset(offset) {
                debug!(monitor = NAME, error = %e, "start offset applied late");
            }
        }
    }

    fn read_handles(&mut self) -> Result<[u64; PARAMS.len()], CollectError> {
        let mut totals = [0u64; PARAMS.len()];
        for handle in &mut self.handles {
            totals[handle.param] += handle.read()?;
        }
        Ok(totals)
    }

    fn read_fresh(&self, read_root: &Path) -> Result<[u64; PARAMS.len()], CollectError> {
        let mut totals = [0u64; PARAMS.len()];
        for (param, p) in PARAMS.iter().enumerate() {
            for device in &self.devices {
                let path = rooted(Some(read_root), counter_path(&self.net_path, device, p.name()));
                totals[param] += parse_counter(&self.fs.read_to_string(&path)?)?;
            }
        }
        Ok(totals)
    }
}

impl<F: FileSystem> Monitor for NetMonitor<F> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn update(&mut self, _pids: &[u32], read_root: Option<&Path>) -> Result<(), CollectError> {
        // All counters are read before any is committed, so a failed read
        // leaves the whole probe at its previous values.
        let totals = match read_root {
            Some(root) => self.read_fresh(root)?,
            None => self.read_handles()?,
        };
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

fn counter_path(net_path: &Path, device: &str, counter: &str) -> PathBuf {
    net_path.join(device).join("statistics").join(counter)
}

fn parse_counter(content: &str) -> Result<u64, CollectError> {
    content
        .trim()
        .parse()
        .map_err(|e| CollectError::Parse(format!("bad counter {:?}: {}", content.trim(), e)))
}

fn list_devices<F: FileSystem>(fs: &F, net_path: &Path) -> Vec<String> {
    match fs.read_dir(net_path) {
        Ok(entries) => {
            let devices: Vec<String> = entries
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            debug!(monitor = NAME, ?devices, "watching all network devices");
            devices
        }
        Err(e) => {
            warn!(
                monitor = NAME,
                path = %net_path.display(),
                error = %e,
                "cannot list network devices, no network data will be available"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;

    #[test]
    fn test_netmon_lists_all_devices() {
        let mon = NetMonitor::with_fs(MockFs::net_devices(), &[]);
        assert_eq!(mon.devices(), ["eth0".to_string(), "lo".to_string()]);
        assert_eq!(mon.handles.len(), 8);
    }

    #[test]
    fn test_netmon_is_relative_to_start() {
        let mut mon = NetMonitor::with_fs(MockFs::net_devices(), &[]);
        assert_eq!(mon.values.get("rx_bytes").unwrap().offset(), 10_500);
        assert_eq!(mon.values.get("tx_packets").unwrap().offset(), 45);
        assert!(mon.values.iter().all(|v| v.get() == 0 && v.iterations() == 0));

        mon.update(&[], None).unwrap();
        assert!(mon.text_stats().iter().all(|(_, v)| *v == 0));

        // Steady counters give the same offsets when taken again.
        mon.apply_start_offsets();
        assert_eq!(mon.values.get("rx_bytes").unwrap().offset(), 10_500);
    }

    #[test]
    fn test_netmon_rereads_open_handles() {
        let dir = tempfile::tempdir().unwrap();
        let stats = dir.path().join("eth0/statistics");
        std::fs::create_dir_all(&stats).unwrap();
        for counter in ["rx_bytes", "rx_packets", "tx_bytes", "tx_packets"] {
            std::fs::write(stats.join(counter), "100\n").unwrap();
        }

        let mut mon = NetMonitor::with_net_path(RealFs::new(), &["eth0".to_string()], dir.path());
        std::fs::write(stats.join("rx_bytes"), "350\n").unwrap();
        std::fs::write(stats.join("tx_bytes"), "1100\n").unwrap();
        mon.update(&[], None).unwrap();

        assert_eq!(
            mon.text_stats(),
            vec![
                ("rx_bytes", 250),
                ("rx_packets", 0),
                ("tx_bytes", 1000),
                ("tx_packets", 0),
            ]
        );
        // 1000 B over 4 seconds.
        let averages = mon.json_averages(4 * clock_ticks());
        assert_eq!(averages[2], ("tx_bytes", 250.0));
    }

    #[test]
    fn test_netmon_drop_is_masked() {
        let mut mon = NetMonitor::with_fs(MockFs::counter_drop(), &["eth0".to_string()]);
        let mut rx = Vec::new();
        for step in 1..=3 {
            let root = format!("/fixture/drop/{}", step);
            mon.update(&[1729], Some(Path::new(&root))).unwrap();
            rx.push(mon.text_stats()[0].1);
        }
        assert_eq!(rx, vec![500_000, 1_000_000, 1_000_000]);
    }

    #[test]
    fn test_netmon_failed_read_keeps_values() {
        let mut mon = NetMonitor::with_fs(MockFs::counter_drop(), &["eth0".to_string()]);
        mon.update(&[], Some(Path::new("/fixture/drop/1"))).unwrap();
        assert!(mon.update(&[], Some(Path::new("/fixture/missing"))).is_err());
        assert_eq!(mon.text_stats()[0], ("rx_bytes", 500_000));
    }
}
