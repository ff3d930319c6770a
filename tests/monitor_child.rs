//! End-to-end runs against real short-lived children.
//!
//! Everything lives in one test function: the sampler reaps with
//! `waitpid(-1)`, which would race children spawned by parallel tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tempfile::tempdir;

use treemon::config::{Config, Target};
use treemon::monitor::Registry;
use treemon::sampler::Sampler;
use treemon::signals::ShutdownFlag;

fn command(argv: &[&str]) -> Target {
    Target::Command(argv.iter().map(|s| s.to_string()).collect())
}

fn run_config(dir: &Path, target: Target) -> Config {
    let mut config = Config::new(target);
    config.text_log = dir.join("treemon.txt");
    config.json_summary = dir.join("treemon.json");
    config.interval = Duration::from_secs(1);
    config.disabled = vec!["netmon".to_string(), "nvidiamon".to_string()];
    config
}

/// Polls `path` until `stop` is set; returns (successful reads, parse failures).
fn poll_snapshot(path: PathBuf, stop: Arc<AtomicBool>) -> thread::JoinHandle<(usize, usize)> {
    thread::spawn(move || {
        let mut reads = 0;
        let mut broken = 0;
        while !stop.load(Ordering::SeqCst) {
            if let Ok(content) = fs::read_to_string(&path) {
                reads += 1;
                if serde_json::from_str::<Value>(&content).is_err() {
                    broken += 1;
                }
            }
            thread::sleep(Duration::from_millis(20));
        }
        (reads, broken)
    })
}

#[test]
fn test_monitor_child_processes() {
    let registry = Registry::with_builtin();

    // A child that sleeps through a few intervals.
    let dir = tempdir().unwrap();
    let config = run_config(dir.path(), command(&["sleep", "2"]));
    let snapshot = dir.path().join("treemon.json_snapshot");

    let stop = Arc::new(AtomicBool::new(false));
    let poller = poll_snapshot(snapshot.clone(), stop.clone());

    let sampler = Sampler::launch(config.clone(), &registry, ShutdownFlag::new()).unwrap();
    assert!(!sampler.monitor_names().contains(&"netmon"));
    assert_eq!(sampler.run(), 0);

    stop.store(true, Ordering::SeqCst);
    let (reads, broken) = poller.join().unwrap();
    assert!(reads > 0);
    assert_eq!(broken, 0);

    assert!(!snapshot.exists());
    let summary: Value =
        serde_json::from_str(&fs::read_to_string(&config.json_summary).unwrap()).unwrap();
    assert!(summary["Max"]["wtime"].as_u64().unwrap() >= 1);
    assert!(summary["Max"]["nprocs"].as_u64().unwrap() >= 1);
    assert!(summary["Max"].get("rx_bytes").is_none());
    assert!(summary.get("HW").is_some());

    let log = fs::read_to_string(&config.text_log).unwrap();
    let mut lines = log.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("Time\twtime\t"));
    assert!(!header.contains("rx_bytes"));
    let columns = header.split('\t').count();
    let rows: Vec<&str> = lines.collect();
    assert!(rows.len() >= 2);
    assert!(rows.iter().all(|row| row.split('\t').count() == columns));

    // The child's exit status becomes the monitor's.
    let dir = tempdir().unwrap();
    let config = run_config(dir.path(), command(&["sh", "-c", "sleep 1; exit 3"]));
    let sampler = Sampler::launch(config, &registry, ShutdownFlag::new()).unwrap();
    assert_eq!(sampler.run(), 3);

    // A stop request ends monitoring before the child exits.
    let dir = tempdir().unwrap();
    let config = run_config(dir.path(), command(&["sleep", "30"]));
    let shutdown = ShutdownFlag::new();
    let sampler = Sampler::launch(config.clone(), &registry, shutdown.clone()).unwrap();
    let child = sampler.root_pid();
    let requester = thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        shutdown.request();
    });
    assert_eq!(sampler.run(), 0);
    requester.join().unwrap();
    assert!(config.json_summary.exists());

    // Clean up the still-running sleep.
    let _ = std::process::Command::new("kill")
        .arg(child.to_string())
        .status();
}
