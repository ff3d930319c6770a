//! Parsers for cgroup v1 and v2 files.

/// One line of `/proc/[pid]/cgroup`: `hierarchy-ID:controller-list:path`.
#[derive(Debug, Clone, PartialEq)]
pub struct CgroupMembership {
    pub hierarchy_id: u32,
    pub controllers: Vec<String>,
    pub path: String,
}

/// Parses `/proc/[pid]/cgroup`.
///
/// The v2 unified entry has hierarchy 0 and an empty controller list.
pub fn parse_proc_cgroup(content: &str) -> Vec<CgroupMembership> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let hierarchy_id = parts.next()?.parse().ok()?;
            let controllers = parts
                .next()?
                .split(',')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
            let path = parts.next()?.to_string();
            Some(CgroupMembership {
                hierarchy_id,
                controllers,
                path,
            })
        })
        .collect()
}

/// CPU accounting, in microseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CgroupCpuStat {
    pub usage_usec: u64,
    pub user_usec: u64,
    pub system_usec: u64,
    pub nr_periods: u64,
    pub throttled_usec: u64,
}

/// Parses v2 cpu.stat file.
/// Format: key value pairs, one per line
pub fn parse_cpu_stat(content: &str) -> CgroupCpuStat {
    let mut info = CgroupCpuStat::default();

    for (key, value) in flat_keyed(content) {
        match key {
            "usage_usec" => info.usage_usec = value,
            "user_usec" => info.user_usec = value,
            "system_usec" => info.system_usec = value,
            "nr_periods" => info.nr_periods = value,
            "throttled_usec" => info.throttled_usec = value,
            _ => {}
        }
    }

    info
}

/// Parses v1 cpuacct.stat file (values in USER_HZ ticks).
///
/// Returns `(user_ticks, system_ticks)`.
pub fn parse_cpuacct_stat(content: &str) -> (u64, u64) {
    let mut user = 0;
    let mut system = 0;
    for (key, value) in flat_keyed(content) {
        match key {
            "user" => user = value,
            "system" => system = value,
            _ => {}
        }
    }
    (user, system)
}

/// Parses v1 cpu.stat file (CFS bandwidth control).
///
/// Returns `(nr_periods, throttled_usec)`; the kernel reports
/// `throttled_time` in nanoseconds.
pub fn parse_cpu_stat_v1(content: &str) -> (u64, u64) {
    let mut periods = 0;
    let mut throttled_ns = 0;
    for (key, value) in flat_keyed(content) {
        match key {
            "nr_periods" => periods = value,
            "throttled_time" => throttled_ns = value,
            _ => {}
        }
    }
    (periods, throttled_ns / 1000)
}

/// Memory breakdown in bytes (fault counters are event counts).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CgroupMemoryStat {
    pub anon: u64,
    pub file: u64,
    pub kernel: u64,
    pub slab: u64,
    pub pgfault: u64,
    pub pgmajfault: u64,
}

/// Parses v2 memory.stat file (partial fields).
/// Format: key value pairs, one per line
pub fn parse_memory_stat(content: &str) -> CgroupMemoryStat {
    let mut info = CgroupMemoryStat::default();
    let mut kernel_stack = 0;

    for (key, value) in flat_keyed(content) {
        match key {
            "anon" => info.anon = value,
            "file" => info.file = value,
            "kernel" => info.kernel = value,
            "kernel_stack" => kernel_stack = value,
            "slab" => info.slab = value,
            "pgfault" => info.pgfault = value,
            "pgmajfault" => info.pgmajfault = value,
            _ => {}
        }
    }

    // Kernels before 5.18 have no aggregate "kernel" key.
    if info.kernel == 0 {
        info.kernel = kernel_stack;
    }

    info
}

/// Parses v1 memory.stat file, using the hierarchical `total_*` keys.
pub fn parse_memory_stat_v1(content: &str) -> CgroupMemoryStat {
    let mut info = CgroupMemoryStat::default();

    for (key, value) in flat_keyed(content) {
        match key {
            "total_active_anon" | "total_inactive_anon" => info.anon += value,
            "total_active_file" | "total_inactive_file" => info.file += value,
            "total_slab" => info.slab = value,
            "total_pgfault" => info.pgfault = value,
            "total_pgmajfault" => info.pgmajfault = value,
            _ => {}
        }
    }

    info
}

/// Parses memory.max (v2) or memory.limit_in_bytes (v1).
///
/// Returns `None` when the cgroup is unlimited: the literal `max` in v2,
/// or the page-rounded `i64::MAX` sentinel in v1.
pub fn parse_memory_max(content: &str) -> Option<u64> {
    const V1_UNLIMITED: u64 = 0x7FFF_FFFF_FFFF_F000;

    let trimmed = content.trim();
    if trimmed == "max" {
        return None;
    }
    trimmed.parse().ok().filter(|&v| v < V1_UNLIMITED)
}

/// Parses a file holding a single number.
pub fn parse_single_value(content: &str) -> Option<u64> {
    content.split_whitespace().next()?.parse().ok()
}

/// Counts the non-empty lines of cgroup.procs, cgroup.threads or tasks.
pub fn count_ids(content: &str) -> u64 {
    content.lines().filter(|l| !l.trim().is_empty()).count() as u64
}

/// Parses v2 io.stat file, summed over devices.
///
/// Format: one device per line:
/// `MAJOR:MINOR rbytes=.. wbytes=.. rios=.. wios=.. [other fields...]`
///
/// Returns `(read_bytes, write_bytes)`.
pub fn parse_io_stat(content: &str) -> (u64, u64) {
    let mut read = 0;
    let mut write = 0;

    for line in content.lines() {
        for field in line.split_whitespace().skip(1) {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            let value: u64 = value.parse().unwrap_or(0);
            match key {
                "rbytes" => read += value,
                "wbytes" => write += value,
                _ => {}
            }
        }
    }

    (read, write)
}

/// Parses v1 blkio.throttle.io_service_bytes, summed over devices.
///
/// Format: `MAJOR:MINOR Operation bytes`, followed by a `Total bytes` line
/// that is skipped.
pub fn parse_blkio_service_bytes(content: &str) -> (u64, u64) {
    let mut read = 0;
    let mut write = 0;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            continue;
        }
        let value: u64 = parts[2].parse().unwrap_or(0);
        match parts[1] {
            "Read" => read += value,
            "Write" => write += value,
            _ => {}
        }
    }

    (read, write)
}

fn flat_keyed(content: &str) -> impl Iterator<Item = (&str, u64)> {
    content.lines().filter_map(|line| {
        let mut parts = line.split_whitespace();
        let key = parts.next()?;
        let value = parts.next()?.parse().ok()?;
        Some((key, value))
    })
}
