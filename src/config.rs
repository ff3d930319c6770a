//! Run configuration and its startup validation.

use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::Registry;
use crate::monitor::wallmon;

/// Environment variable holding a comma-separated list of probes to
/// disable, merged with `--disable`.
pub const DISABLE_ENV: &str = "TREEMON_DISABLE_MONITOR";

/// Error type for configuration problems. All are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// PID is not a monitorable process ID.
    BadPid(i64),
    /// Both a PID and a child command were given.
    ConflictingTarget,
    /// Neither a PID nor a child command was given.
    MissingTarget,
    /// A disable request names a probe that is not registered.
    UnknownMonitor(String),
    /// The wall clock probe cannot be disabled.
    WallmonDisabled,
    /// The active set has no wall clock probe.
    MissingWallclock,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::BadPid(pid) => write!(f, "bad PID to monitor: {}", pid),
            ConfigError::ConflictingTarget => {
                write!(f, "a PID and a child command cannot both be given")
            }
            ConfigError::MissingTarget => write!(f, "either a PID or a child command is required"),
            ConfigError::UnknownMonitor(name) => write!(f, "unknown monitor {:?}", name),
            ConfigError::WallmonDisabled => write!(f, "{} cannot be disabled", wallmon::NAME),
            ConfigError::MissingWallclock => {
                write!(f, "{} is not active, elapsed time is unavailable", wallmon::NAME)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// What to monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Attach to an existing process.
    Pid(u32),
    /// Launch this command (program and arguments) and monitor it.
    Command(Vec<String>),
}

impl Target {
    /// Resolves `--pid` and the trailing child command into a target.
    pub fn resolve(pid: Option<i64>, command: Vec<String>) -> Result<Self, ConfigError> {
        match (pid, command.is_empty()) {
            (Some(_), false) => Err(ConfigError::ConflictingTarget),
            (None, true) => Err(ConfigError::MissingTarget),
            (None, false) => Ok(Target::Command(command)),
            (Some(pid), true) => {
                // PID 1 is init; 0 and negatives address process groups.
                if pid < 2 || pid > i64::from(i32::MAX) {
                    return Err(ConfigError::BadPid(pid));
                }
                Ok(Target::Pid(pid as u32))
            }
        }
    }
}

/// Everything the sampler needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub target: Target,
    /// Tabular time-series log.
    pub text_log: PathBuf,
    /// Final JSON summary; the snapshot lives next to it.
    pub json_summary: PathBuf,
    pub interval: Duration,
    /// Network devices to watch; empty means all.
    pub netdevs: Vec<String>,
    /// Probes to leave out of the active set.
    pub disabled: Vec<String>,
    pub store_hw_info: bool,
    pub store_units: bool,
}

impl Config {
    pub const DEFAULT_TEXT_LOG: &str = "treemon.txt";
    pub const DEFAULT_JSON_SUMMARY: &str = "treemon.json";
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    /// Creates a configuration with default paths and interval.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            text_log: PathBuf::from(Self::DEFAULT_TEXT_LOG),
            json_summary: PathBuf::from(Self::DEFAULT_JSON_SUMMARY),
            interval: Self::DEFAULT_INTERVAL,
            netdevs: Vec::new(),
            disabled: Vec::new(),
            store_hw_info: true,
            store_units: false,
        }
    }
}

/// Merges CLI disable requests with the environment's list and validates
/// every name against `registry`.
///
/// Names may themselves be comma-separated. Duplicates are dropped.
pub fn merge_disabled(
    cli: &[String],
    env: Option<&str>,
    registry: &Registry,
) -> Result<Vec<String>, ConfigError> {
    let mut disabled: Vec<String> = Vec::new();
    let requests = cli
        .iter()
        .map(String::as_str)
        .chain(env)
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty());

    for name in requests {
        if name == wallmon::NAME {
            return Err(ConfigError::WallmonDisabled);
        }
        if !registry.is_registered(name) {
            return Err(ConfigError::UnknownMonitor(name.to_string()));
        }
        if !disabled.iter().any(|d| d == name) {
            disabled.push(name.to_string());
        }
    }
    Ok(disabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_target_resolve() {
        assert_eq!(Target::resolve(Some(1729), vec![]), Ok(Target::Pid(1729)));
        assert_eq!(
            Target::resolve(None, names(&["sleep", "5"])),
            Ok(Target::Command(names(&["sleep", "5"])))
        );
        assert_eq!(
            Target::resolve(Some(1729), names(&["sleep"])),
            Err(ConfigError::ConflictingTarget)
        );
        assert_eq!(Target::resolve(None, vec![]), Err(ConfigError::MissingTarget));
        assert_eq!(Target::resolve(Some(1), vec![]), Err(ConfigError::BadPid(1)));
        assert_eq!(Target::resolve(Some(-5), vec![]), Err(ConfigError::BadPid(-5)));
    }

    #[test]
    fn test_merge_disabled() {
        let registry = Registry::with_builtin();
        let merged = merge_disabled(
            &names(&["netmon", "iomon"]),
            Some("nvidiamon, netmon,"),
            &registry,
        )
        .unwrap();
        assert_eq!(merged, names(&["netmon", "iomon", "nvidiamon"]));
        assert!(merge_disabled(&[], None, &registry).unwrap().is_empty());
    }

    #[test]
    fn test_merge_disabled_rejects() {
        let registry = Registry::with_builtin();
        assert_eq!(
            merge_disabled(&names(&["wallmon"]), None, &registry),
            Err(ConfigError::WallmonDisabled)
        );
        assert_eq!(
            merge_disabled(&[], Some("cpumon,diskmon"), &registry),
            Err(ConfigError::UnknownMonitor("diskmon".to_string()))
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::new(Target::Pid(42));
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.json_summary, PathBuf::from("treemon.json"));
        assert!(config.store_hw_info);
    }
}
