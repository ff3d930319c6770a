//! treemon - resource monitor for a process tree.
//!
//! Attaches to a PID or launches a command, samples the whole tree every
//! interval, and writes a tab-separated log plus a JSON summary of peaks and
//! averages.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use treemon::config::{Config, ConfigError, DISABLE_ENV, Target, merge_disabled};
use treemon::monitor::Registry;
use treemon::sampler::Sampler;
use treemon::signals::ShutdownFlag;

/// Resource monitor for a process and all of its descendants.
#[derive(Parser)]
#[command(name = "treemon", about = "Process-tree resource monitor", version)]
struct Args {
    /// Attach to this already running process.
    #[arg(short, long, allow_negative_numbers = true)]
    pid: Option<i64>,

    /// Tab-separated time-series output.
    #[arg(short, long, default_value = Config::DEFAULT_TEXT_LOG)]
    filename: PathBuf,

    /// JSON summary output; `<path>_snapshot` is updated while running.
    #[arg(short, long, default_value = Config::DEFAULT_JSON_SUMMARY)]
    json_summary: PathBuf,

    /// Also write diagnostics to this file.
    #[arg(long, value_name = "PATH")]
    log_filename: Option<PathBuf>,

    /// Sampling interval in seconds.
    #[arg(short, long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Do not record host hardware in the JSON summary.
    #[arg(short, long)]
    suppress_hw_info: bool,

    /// Record parameter units in the JSON summary.
    #[arg(short, long)]
    units: bool,

    /// Network device to watch (repeatable). Default: all devices.
    #[arg(short, long = "netdev", value_name = "DEVICE")]
    netdevs: Vec<String>,

    /// Monitor to disable (repeatable, comma-separated lists accepted).
    /// Merged with the TREEMON_DISABLE_MONITOR environment variable.
    #[arg(short, long = "disable", value_name = "MONITOR")]
    disabled: Vec<String>,

    /// Print the available monitors and exit.
    #[arg(long)]
    list_monitors: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Command to launch and monitor.
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

/// Initializes the tracing subscriber: stderr always, plus `log_file` with
/// ANSI colours off when given.
fn init_logging(verbose: u8, quiet: bool, log_file: Option<&PathBuf>) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("treemon={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    let file_layer = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("cannot open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn list_monitors(registry: &Registry) {
    for name in registry.list_registered() {
        println!("{:<10} {}", name, registry.describe(name).unwrap_or(""));
    }
}

fn build_config(args: Args, registry: &Registry) -> Result<Config, ConfigError> {
    let target = Target::resolve(args.pid, args.command)?;
    let env = std::env::var(DISABLE_ENV).ok();
    let disabled = merge_disabled(&args.disabled, env.as_deref(), registry)?;

    let mut config = Config::new(target);
    config.text_log = args.filename;
    config.json_summary = args.json_summary;
    config.interval = Duration::from_secs(args.interval);
    config.netdevs = args.netdevs;
    config.disabled = disabled;
    config.store_hw_info = !args.suppress_hw_info;
    config.store_units = args.units;
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet, args.log_filename.as_ref());

    let registry = Registry::with_builtin();
    if args.list_monitors {
        list_monitors(&registry);
        return ExitCode::SUCCESS;
    }

    let config = match build_config(args, &registry) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    info!(
        "treemon {} starting: interval={}s, log={}, summary={}",
        env!("CARGO_PKG_VERSION"),
        config.interval.as_secs(),
        config.text_log.display(),
        config.json_summary.display()
    );

    let shutdown = ShutdownFlag::with_signal_handlers();
    let sampler = match Sampler::launch(config, &registry, shutdown) {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let code = sampler.run();
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
