//! The sampling loop.
//!
//! A [`Sampler`] moves through `Initializing → Sampling → Draining →
//! Terminated`. Each sample discovers the tree, updates every active probe,
//! appends a row to the text log and republishes the JSON snapshot. A probe
//! that fails to update keeps its previous values for that interval.

use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::collector::RealFs;
use crate::config::{Config, ConfigError, Target};
use crate::monitor::{Monitor, Registry, wallmon};
use crate::output::{SinkError, SnapshotWriter, Summary, TabularLog};
use crate::pidtree::{ProcessTree, select_discovery};
use crate::process::{is_alive, reap_children, spawn_child};
use crate::signals::ShutdownFlag;

/// Granularity of exit-condition checks between samples.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    Sampling,
    Draining,
    Terminated,
}

/// Error type for failures that prevent monitoring from starting.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    /// The child command could not be launched.
    Launch(io::Error),
    /// The text log could not be created.
    Sink(SinkError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "configuration error: {}", e),
            RunError::Launch(e) => write!(f, "failed to launch child: {}", e),
            RunError::Sink(e) => write!(f, "output error: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::Launch(e) => Some(e),
            RunError::Sink(e) => Some(e),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Config(e)
    }
}

impl From<SinkError> for RunError {
    fn from(e: SinkError) -> Self {
        RunError::Sink(e)
    }
}

pub struct Sampler {
    config: Config,
    root_pid: u32,
    launched: bool,
    child_exit: Option<i32>,
    monitors: Vec<Box<dyn Monitor>>,
    discovery: Box<dyn ProcessTree>,
    log: TabularLog,
    snapshot: SnapshotWriter,
    summary: Summary,
    shutdown: ShutdownFlag,
    state: State,
    samples: u64,
}

impl Sampler {
    /// Resolves the target (launching the child if asked to) and prepares
    /// the run against the live system.
    pub fn launch(
        config: Config,
        registry: &Registry,
        shutdown: ShutdownFlag,
    ) -> Result<Self, RunError> {
        let (root_pid, launched) = match &config.target {
            Target::Pid(pid) => (*pid, false),
            Target::Command(argv) => (spawn_child(argv).map_err(RunError::Launch)?, true),
        };
        let discovery = select_discovery(RealFs::new(), root_pid);
        Self::from_registry(config, registry, root_pid, launched, discovery, shutdown)
    }

    /// Builds the active probe set from `registry` and opens the outputs.
    pub fn from_registry(
        config: Config,
        registry: &Registry,
        root_pid: u32,
        launched: bool,
        discovery: Box<dyn ProcessTree>,
        shutdown: ShutdownFlag,
    ) -> Result<Self, RunError> {
        let monitors = registry.active_set(&config.disabled, &config.netdevs);
        if !monitors.iter().any(|m| m.name() == wallmon::NAME) {
            return Err(ConfigError::MissingWallclock.into());
        }
        let names: Vec<&str> = monitors.iter().map(|m| m.name()).collect();
        info!(pid = root_pid, monitors = ?names, strategy = discovery.strategy(), "monitoring");

        let mut summary = Summary::new();
        summary.collect_metadata(&monitors, config.store_hw_info, config.store_units);

        let columns = monitors
            .iter()
            .flat_map(|m| m.text_stats().into_iter().map(|(name, _)| name))
            .collect();
        let log = TabularLog::create(&config.text_log, columns)?;
        let snapshot = SnapshotWriter::new(&config.json_summary);

        Ok(Self {
            config,
            root_pid,
            launched,
            child_exit: None,
            monitors,
            discovery,
            log,
            snapshot,
            summary,
            shutdown,
            state: State::Initializing,
            samples: 0,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn root_pid(&self) -> u32 {
        self.root_pid
    }

    /// Names of the active probes, in output order.
    pub fn monitor_names(&self) -> Vec<&'static str> {
        self.monitors.iter().map(|m| m.name()).collect()
    }

    /// Takes one sample and publishes it.
    ///
    /// `read_root` redirects probe reads to a fixture tree.
    pub fn sample_once(&mut self, read_root: Option<&Path>) {
        let pids = self.discovery.discover(self.root_pid);
        debug!(processes = pids.len(), "tree discovered");

        for monitor in &mut self.monitors {
            if let Err(e) = monitor.update(&pids, read_root) {
                warn!(monitor = monitor.name(), error = %e, "update failed, keeping previous values");
            }
        }
        self.samples += 1;

        let row: Vec<(&'static str, u64)> = self
            .monitors
            .iter()
            .flat_map(|m| m.text_stats())
            .collect();
        if let Err(e) = self.log.append(Utc::now().timestamp(), &row) {
            error!(error = %e, "failed to append to text log");
        }

        let doc = self.summary.build(&self.monitors, self.elapsed_ticks());
        if let Err(e) = self.snapshot.publish(&doc) {
            error!(path = %self.snapshot.snapshot_path().display(), error = %e, "failed to publish snapshot");
        }
    }

    /// Samples until the root exits or a stop is requested, then drains.
    ///
    /// Returns the process exit code: the launched child's status, else 0.
    pub fn run(mut self) -> i32 {
        self.state = State::Sampling;
        let mut last_sample: Option<Instant> = None;

        loop {
            if last_sample.is_none_or(|t| t.elapsed() >= self.config.interval) {
                last_sample = Some(Instant::now());
                self.sample_once(None);
            }
            thread::sleep(SLEEP_SLICE);
            self.reap();

            if self.shutdown.is_requested() {
                info!("stop requested");
                break;
            }
            if !is_alive(self.root_pid) {
                info!(pid = self.root_pid, "monitored process exited");
                break;
            }
        }
        self.drain()
    }

    /// Final forced sample, snapshot removal and final summary.
    pub fn drain(&mut self) -> i32 {
        self.state = State::Draining;
        self.reap();
        self.sample_once(None);

        if let Err(e) = self.snapshot.remove_snapshot() {
            warn!(error = %e, "failed to remove snapshot");
        }
        let doc = self.summary.build(&self.monitors, self.elapsed_ticks());
        match self.snapshot.write_final(&doc) {
            Ok(()) => info!(
                path = %self.snapshot.final_path().display(),
                samples = self.samples,
                "summary written"
            ),
            Err(e) => error!(error = %e, "failed to write final summary"),
        }

        self.state = State::Terminated;
        self.exit_code()
    }

    pub fn exit_code(&self) -> i32 {
        if self.launched {
            self.child_exit.unwrap_or(0)
        } else {
            0
        }
    }

    /// Attached runs have no children of their own to reap.
    fn reap(&mut self) {
        if !self.launched {
            return;
        }
        if let Some(code) = reap_children(Some(self.root_pid)) {
            self.child_exit = Some(code);
        }
    }

    fn elapsed_ticks(&self) -> u64 {
        self.monitors
            .iter()
            .find_map(|m| m.wallclock_ticks())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::monitor::Constructor;
    use crate::monitor::iomon::IoMonitor;
    use crate::monitor::netmon::NetMonitor;
    use crate::monitor::wallmon::WallMonitor;
    use crate::pidtree::ProcChildren;
    use serde_json::Value;
    use std::fs;
    use tempfile::tempdir;

    fn mock_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            "wallmon",
            Constructor::Plain(|| Box::new(WallMonitor::with_fs(MockFs::process_tree()))),
            "wall clock",
        );
        registry.register(
            "iomon",
            Constructor::Plain(|| Box::new(IoMonitor::with_fs(MockFs::process_tree()))),
            "io",
        );
        registry.register(
            "netmon",
            Constructor::WithDevices(|devices| {
                Box::new(NetMonitor::with_fs(MockFs::net_devices(), devices))
            }),
            "network",
        );
        registry
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::new(Target::Pid(1729));
        config.text_log = dir.join("treemon.txt");
        config.json_summary = dir.join("treemon.json");
        config.store_units = true;
        config
    }

    fn sampler(config: Config, registry: &Registry) -> Result<Sampler, RunError> {
        Sampler::from_registry(
            config,
            registry,
            1729,
            false,
            Box::new(ProcChildren::with_fs(MockFs::process_tree())),
            ShutdownFlag::new(),
        )
    }

    #[test]
    fn test_sample_and_drain() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let mut sampler = sampler(config.clone(), &mock_registry()).unwrap();
        assert_eq!(sampler.state(), State::Initializing);
        assert_eq!(sampler.monitor_names(), vec!["wallmon", "iomon", "netmon"]);

        sampler.sample_once(None);
        let snap_path = dir.path().join("treemon.json_snapshot");
        let snap: Value = serde_json::from_str(&fs::read_to_string(&snap_path).unwrap()).unwrap();
        assert_eq!(snap["Max"]["rchar"], 4000);
        assert_eq!(snap["Max"]["rx_bytes"], 0);
        assert_eq!(snap["Units"]["Avg"]["rchar"], "B/s");

        assert_eq!(sampler.drain(), 0);
        assert_eq!(sampler.state(), State::Terminated);
        assert!(!snap_path.exists());

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(&config.json_summary).unwrap()).unwrap();
        let max: Vec<&String> = summary["Max"].as_object().unwrap().keys().collect();
        assert_eq!(
            max,
            [
                "wtime",
                "rchar",
                "wchar",
                "read_bytes",
                "write_bytes",
                "rx_bytes",
                "rx_packets",
                "tx_bytes",
                "tx_packets",
            ]
        );
        // uptime 1000 s, process started 500 s after boot
        assert_eq!(summary["Max"]["wtime"], 500);

        let log = fs::read_to_string(&config.text_log).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Time\twtime\trchar\t"));
        assert!(lines[1].ends_with("\t500\t4000\t2000\t16384\t8192\t0\t0\t0\t0"));
    }

    #[test]
    fn test_disabled_netmon_leaves_no_keys() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.disabled = vec!["netmon".to_string()];
        let mut sampler = sampler(config.clone(), &mock_registry()).unwrap();
        assert!(!sampler.monitor_names().contains(&"netmon"));

        sampler.sample_once(None);
        sampler.drain();

        let log = fs::read_to_string(&config.text_log).unwrap();
        let summary = fs::read_to_string(&config.json_summary).unwrap();
        for key in ["rx_bytes", "rx_packets", "tx_bytes", "tx_packets"] {
            assert!(!log.contains(key));
            assert!(!summary.contains(key));
        }
    }

    #[test]
    fn test_missing_wallclock_is_fatal() {
        let dir = tempdir().unwrap();
        let mut registry = mock_registry();
        registry.unregister("wallmon");
        assert!(matches!(
            sampler(config_in(dir.path()), &registry),
            Err(RunError::Config(ConfigError::MissingWallclock))
        ));
    }

    #[test]
    fn test_unwritable_log_is_fatal() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.text_log = dir.path().join("missing/treemon.txt");
        assert!(matches!(
            sampler(config, &mock_registry()),
            Err(RunError::Sink(_))
        ));
    }

    #[test]
    fn test_failed_update_keeps_values() {
        let dir = tempdir().unwrap();
        let mut sampler = sampler(config_in(dir.path()), &mock_registry()).unwrap();
        sampler.sample_once(None);
        // Every probe fails below an empty fixture root.
        sampler.sample_once(Some(Path::new("/nonexistent")));

        let log = fs::read_to_string(dir.path().join("treemon.txt")).unwrap();
        let rows: Vec<&str> = log.lines().skip(1).collect();
        let values = |row: &str| row.split('\t').skip(1).map(str::to_string).collect::<Vec<_>>();
        assert_eq!(values(rows[0]), values(rows[1]));
    }
}
