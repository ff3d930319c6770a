//! Name-keyed factory for probes.
//!
//! The orchestrator never names a concrete probe type: it asks the
//! [`Registry`] for the active set and receives boxed [`Monitor`]s.

use std::collections::HashSet;

use tracing::warn;

use super::Monitor;
use super::{cgroupmon, countmon, cpumon, iomon, memmon, netmon, nvidiamon, wallmon};

/// How a registered probe is constructed.
#[derive(Clone, Copy)]
pub enum Constructor {
    /// Takes no arguments.
    Plain(fn() -> Box<dyn Monitor>),
    /// Takes the list of network devices to watch (empty means all).
    WithDevices(fn(&[String]) -> Box<dyn Monitor>),
}

impl Constructor {
    fn build(&self, devices: &[String]) -> Box<dyn Monitor> {
        match self {
            Constructor::Plain(f) => f(),
            Constructor::WithDevices(f) => f(devices),
        }
    }
}

impl std::fmt::Debug for Constructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constructor::Plain(_) => f.write_str("Plain"),
            Constructor::WithDevices(_) => f.write_str("WithDevices"),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: &'static str,
    description: &'static str,
    constructor: Constructor,
}

/// Ordered set of constructible probes.
///
/// Registration order is the output order of every surface.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in probe.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            wallmon::NAME,
            Constructor::Plain(|| Box::new(wallmon::WallMonitor::new())),
            "Monitors wall clock time of the process tree",
        );
        registry.register(
            cpumon::NAME,
            Constructor::Plain(|| Box::new(cpumon::CpuMonitor::new())),
            "Monitors user and system CPU time",
        );
        registry.register(
            countmon::NAME,
            Constructor::Plain(|| Box::new(countmon::CountMonitor::new())),
            "Monitors the number of processes and threads",
        );
        registry.register(
            memmon::NAME,
            Constructor::Plain(|| Box::new(memmon::MemMonitor::new())),
            "Monitors virtual, resident, proportional and swapped memory",
        );
        registry.register(
            iomon::NAME,
            Constructor::Plain(|| Box::new(iomon::IoMonitor::new())),
            "Monitors bytes read and written",
        );
        registry.register(
            netmon::NAME,
            Constructor::WithDevices(|devices| Box::new(netmon::NetMonitor::new(devices))),
            "Monitors network device traffic",
        );
        registry.register(
            nvidiamon::NAME,
            Constructor::Plain(|| Box::new(nvidiamon::NvidiaMonitor::new())),
            "Monitors NVIDIA GPU activity of the process tree",
        );
        registry.register(
            cgroupmon::NAME,
            Constructor::Plain(|| Box::new(cgroupmon::CgroupMonitor::new())),
            "Monitors the cgroup containing the process tree",
        );
        registry
    }

    /// Adds a probe. Re-registering a name replaces the earlier entry in
    /// place.
    pub fn register(
        &mut self,
        name: &'static str,
        constructor: Constructor,
        description: &'static str,
    ) {
        let entry = Entry {
            name,
            description,
            constructor,
        };
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Removes a probe; returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.entries.len() != before
    }

    /// Constructs the named probe. `devices` is only used by probes that
    /// take a device list.
    pub fn create(&self, name: &str, devices: &[String]) -> Option<Box<dyn Monitor>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.constructor.build(devices))
    }

    /// Registered names in registration order.
    pub fn list_registered(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    pub fn describe(&self, name: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.description)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Names that would be active with `disabled` switched off.
    pub fn active_names(&self, disabled: &[String]) -> Vec<&'static str> {
        let disabled: HashSet<&str> = disabled.iter().map(String::as_str).collect();
        self.entries
            .iter()
            .map(|e| e.name)
            .filter(|name| !disabled.contains(name))
            .collect()
    }

    /// Constructs every probe not in `disabled`, dropping invalid ones with
    /// a warning.
    pub fn active_set(&self, disabled: &[String], devices: &[String]) -> Vec<Box<dyn Monitor>> {
        self.active_names(disabled)
            .into_iter()
            .filter_map(|name| {
                let monitor = self.create(name, devices)?;
                if monitor.is_valid() {
                    Some(monitor)
                } else {
                    warn!(monitor = name, "probe is not usable on this host, disabled");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::monitor::{AverageMap, Parameter, StatMap};
    use std::path::Path;

    struct Fixed {
        valid: bool,
    }

    impl Monitor for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn update(&mut self, _: &[u32], _: Option<&Path>) -> Result<(), crate::collector::CollectError> {
            Ok(())
        }
        fn text_stats(&self) -> StatMap {
            vec![("fixed", 1)]
        }
        fn json_totals(&self) -> StatMap {
            vec![("fixed", 1)]
        }
        fn json_averages(&self, _: u64) -> AverageMap {
            AverageMap::new()
        }
        fn parameter_list(&self) -> &'static [Parameter] {
            &[]
        }
        fn is_valid(&self) -> bool {
            self.valid
        }
    }

    fn test_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            "good",
            Constructor::Plain(|| Box::new(Fixed { valid: true })),
            "always valid",
        );
        registry.register(
            "bad",
            Constructor::Plain(|| Box::new(Fixed { valid: false })),
            "never valid",
        );
        registry.register(
            "net",
            Constructor::WithDevices(|devices| {
                Box::new(netmon::NetMonitor::with_fs(MockFs::net_devices(), devices))
            }),
            "mock network",
        );
        registry
    }

    #[test]
    fn test_builtin_order() {
        let registry = Registry::with_builtin();
        assert_eq!(
            registry.list_registered(),
            vec![
                "wallmon",
                "cpumon",
                "countmon",
                "memmon",
                "iomon",
                "netmon",
                "nvidiamon",
                "cgroupmon",
            ]
        );
        assert!(registry.describe("netmon").unwrap().contains("network"));
        assert!(registry.describe("nosuchmon").is_none());
    }

    #[test]
    fn test_active_names_without_netmon() {
        let registry = Registry::with_builtin();
        let active = registry.active_names(&["netmon".to_string()]);
        assert!(!active.contains(&"netmon"));
        assert!(active.contains(&"wallmon"));
        assert_eq!(active.len(), 7);
    }

    #[test]
    fn test_active_set_drops_invalid() {
        let registry = test_registry();
        let active = registry.active_set(&[], &[]);
        assert_eq!(active.len(), 2);
        assert_eq!(active[1].name(), netmon::NAME);

        let active = registry.active_set(&["net".to_string()], &[]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name(), "fixed");
    }

    #[test]
    fn test_create_passes_devices() {
        let registry = test_registry();
        let mut net = registry.create("net", &["lo".to_string()]).unwrap();
        net.update(&[], Some(Path::new("/"))).unwrap();
        assert!(net.text_stats().iter().all(|(_, v)| *v == 0));
        assert!(registry.create("missing", &[]).is_none());
    }

    #[test]
    fn test_register_replaces_and_unregister() {
        let mut registry = test_registry();
        registry.register(
            "good",
            Constructor::Plain(|| Box::new(Fixed { valid: false })),
            "replaced",
        );
        assert_eq!(registry.list_registered(), vec!["good", "bad", "net"]);
        assert_eq!(registry.describe("good"), Some("replaced"));

        assert!(registry.unregister("bad"));
        assert!(!registry.unregister("bad"));
        assert!(!registry.is_registered("bad"));
        assert!(registry.is_registered("net"));
    }
}
