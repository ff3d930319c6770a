//! Pure parsers over the text of `/proc` files.
//!
//! Callers read the file through the `FileSystem` seam and pass the content
//! in, so every parser is tested on literal strings.

use std::collections::HashSet;

/// A `/proc` file whose content does not have the expected shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed proc file: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// The `/proc/<pid>/stat` fields the probes consume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
    pub cutime: u64,
    pub cstime: u64,
    pub num_threads: u64,
    pub starttime: u64,
    pub vsize: u64,
    pub rss: i64,
}

/// Parses `/proc/<pid>/stat`.
///
/// `comm` may itself contain spaces and parentheses, so it is taken as
/// everything between the first `(` and the last `)`.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();
    let (head, rest) = content
        .split_once('(')
        .ok_or_else(|| ParseError::new("stat has no comm field"))?;
    let (comm, tail) = rest
        .rsplit_once(')')
        .ok_or_else(|| ParseError::new("stat comm field is not closed"))?;

    let pid: u32 = head
        .trim()
        .parse()
        .map_err(|_| ParseError::new(format!("stat pid {:?}", head.trim())))?;
    let comm = comm.to_string();

    // fields[0] is `state`, field 3 in proc(5) numbering.
    let fields: Vec<&str> = tail.split_whitespace().collect();
    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "stat has {} fields after comm, need 22",
            fields.len()
        )));
    }

    let parse_u64 = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    // cutime/cstime are signed in the kernel ABI but never negative in practice.
    let parse_clamped = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse::<i64>()
            .map(|v| v.max(0) as u64)
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };

    Ok(ProcStat {
        pid,
        comm,
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: parse_u64(1, "ppid")? as u32,
        utime: parse_u64(11, "utime")?,
        stime: parse_u64(12, "stime")?,
        cutime: parse_clamped(13, "cutime")?,
        cstime: parse_clamped(14, "cstime")?,
        num_threads: parse_clamped(17, "num_threads")?,
        starttime: parse_u64(19, "starttime")?,
        vsize: parse_u64(20, "vsize")?,
        rss: fields[21]
            .parse()
            .map_err(|_| ParseError::new("invalid rss"))?,
    })
}

/// Cumulative `/proc/<pid>/io` counters, in bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcIo {
    pub rchar: u64,
    pub wchar: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Parses `/proc/<pid>/io`. Content with none of the counters is an error.
pub fn parse_proc_io(content: &str) -> Result<ProcIo, ParseError> {
    let mut io = ProcIo::default();
    let mut seen = 0;

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let slot = match key.trim() {
                "rchar" => &mut io.rchar,
                "wchar" => &mut io.wchar,
                "read_bytes" => &mut io.read_bytes,
                "write_bytes" => &mut io.write_bytes,
                _ => continue,
            };
            *slot = value
                .trim()
                .parse()
                .map_err(|_| ParseError::new(format!("invalid {} in io", key.trim())))?;
            seen += 1;
        }
    }

    if seen == 0 {
        return Err(ParseError::new("no counters in io"));
    }
    Ok(io)
}

/// Memory totals from `/proc/[pid]/smaps` or `smaps_rollup`, in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmapsTotals {
    /// Sum of `Size:` lines. Zero for `smaps_rollup`, which has none.
    pub size: u64,
    pub rss: u64,
    pub pss: u64,
    pub swap: u64,
}

/// Parses `/proc/[pid]/smaps` or `/proc/[pid]/smaps_rollup` content.
///
/// Sums the `Size`, `Rss`, `Pss` and `Swap` lines over all mappings. Keys
/// are matched exactly, so `KernelPageSize`, `Pss_Anon` or `SwapPss` do not
/// leak into the totals.
pub fn parse_smaps(content: &str) -> SmapsTotals {
    let mut totals = SmapsTotals::default();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let slot = match key {
            "Size" => &mut totals.size,
            "Rss" => &mut totals.rss,
            "Pss" => &mut totals.pss,
            "Swap" => &mut totals.swap,
            _ => continue,
        };
        *slot += rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
    }

    totals
}

/// Extracts `VmSize` (kB) from `/proc/[pid]/status`.
///
/// Kernel threads have no `VmSize` line.
pub fn parse_status_vmsize(content: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        line.strip_prefix("VmSize:")
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse().ok())
    })
}

/// Extracts `MemTotal` (kB) from `/proc/meminfo`.
pub fn parse_meminfo_total(content: &str) -> Result<u64, ParseError> {
    content
        .lines()
        .find_map(|line| {
            line.strip_prefix("MemTotal:")
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|v| v.parse().ok())
        })
        .ok_or_else(|| ParseError::new("MemTotal not found in meminfo"))
}

/// Parses `/proc/uptime`, returning system uptime in seconds.
pub fn parse_uptime(content: &str) -> Result<f64, ParseError> {
    content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("empty uptime"))?
        .parse()
        .map_err(|_| ParseError::new("invalid uptime"))
}

/// Parses `/proc/[pid]/task/[tid]/children`: space-separated PIDs.
///
/// Tokens that are not numbers are skipped.
pub fn parse_children(content: &str) -> Vec<u32> {
    content
        .split_whitespace()
        .filter_map(|tok| tok.parse().ok())
        .collect()
}

/// CPU topology summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuTopology {
    pub model_name: String,
    pub cpus: u64,
    pub sockets: u64,
    pub cores_per_socket: u64,
    pub threads_per_core: u64,
}

/// Parses `/proc/cpuinfo` into a topology summary.
///
/// Sockets are counted as distinct `physical id` values; threads per core
/// is `siblings / cpu cores` of the first processor block.
pub fn parse_cpuinfo(content: &str) -> Result<CpuTopology, ParseError> {
    let mut topo = CpuTopology::default();
    let mut physical_ids = HashSet::new();
    let mut siblings = 0u64;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => topo.cpus += 1,
            "model name" if topo.model_name.is_empty() => topo.model_name = value.to_string(),
            "physical id" => {
                physical_ids.insert(value.to_string());
            }
            "siblings" if siblings == 0 => siblings = value.parse().unwrap_or(0),
            "cpu cores" if topo.cores_per_socket == 0 => {
                topo.cores_per_socket = value.parse().unwrap_or(0)
            }
            _ => {}
        }
    }

    if topo.cpus == 0 {
        return Err(ParseError::new("no processors in cpuinfo"));
    }
    topo.sockets = (physical_ids.len() as u64).max(1);
    if topo.cores_per_socket == 0 {
        topo.cores_per_socket = topo.cpus / topo.sockets;
    }
    topo.threads_per_core = if siblings > 0 && topo.cores_per_socket > 0 {
        siblings / topo.cores_per_socket
    } else {
        1
    };
    Ok(topo)
}
