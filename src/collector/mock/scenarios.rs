//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc`, `/sys/class/net` and cgroup
//! states for exercising probes and tree discovery.

use super::filesystem::MockFs;
use std::path::Path;

/// Formats a `/proc/[pid]/stat` line with the fields the probes read.
///
/// Fields not listed are filled with plausible constants.
#[allow(clippy::too_many_arguments)]
pub fn stat_line(
    pid: u32,
    comm: &str,
    ppid: u32,
    utime: u64,
    stime: u64,
    cutime: u64,
    cstime: u64,
    num_threads: u32,
    starttime: u64,
) -> String {
    format!(
        "{pid} ({comm}) S {ppid} {pid} {ppid} 0 -1 4194304 120 0 0 0 \
         {utime} {stime} {cutime} {cstime} 20 0 {num_threads} 0 {starttime} \
         104857600 2048 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0"
    )
}

/// Formats a `/proc/[pid]/io` file.
pub fn io_file(rchar: u64, wchar: u64, read_bytes: u64, write_bytes: u64) -> String {
    format!(
        "rchar: {rchar}\nwchar: {wchar}\nsyscr: 10\nsyscw: 5\n\
         read_bytes: {read_bytes}\nwrite_bytes: {write_bytes}\ncancelled_write_bytes: 0\n"
    )
}

/// Formats a `/proc/[pid]/smaps_rollup` file (sizes in kB).
pub fn smaps_rollup(rss: u64, pss: u64, swap: u64) -> String {
    format!(
        "00400000-7ffc0000000 ---p 00000000 00:00 0                      [rollup]\n\
         Rss:              {rss} kB\n\
         Pss:              {pss} kB\n\
         Pss_Anon:         {pss} kB\n\
         Shared_Clean:        0 kB\n\
         Private_Dirty:    {rss} kB\n\
         Swap:             {swap} kB\n\
         SwapPss:          {swap} kB\n"
    )
}

#[allow(dead_code)]
impl MockFs {
    /// A three-process tree rooted at PID 1729 under `/`.
    ///
    /// ```text
    /// 1729 (job.sh)
    /// ├── 1730 (worker)
    /// │   └── 1732 (helper)
    /// └── 1731 (worker)
    /// ```
    pub fn process_tree() -> Self {
        let mut fs = Self::new();
        let root = Path::new("/");

        fs.add_file("/proc/uptime", "1000.00 3500.00\n");
        fs.add_file(
            "/proc/meminfo",
            "MemTotal:       16384000 kB\nMemFree:         8192000 kB\n",
        );

        let procs: [(u32, &str, u32, u64, u64, u32, &[u32]); 4] = [
            (1729, "job.sh", 1, 100, 20, 1, &[1730, 1731]),
            (1730, "worker", 1729, 300, 40, 4, &[1732]),
            (1731, "worker", 1729, 200, 30, 2, &[]),
            (1732, "helper", 1730, 50, 10, 1, &[]),
        ];
        for (pid, comm, ppid, utime, stime, threads, children) in procs {
            fs.add_process(
                root,
                pid,
                &stat_line(pid, comm, ppid, utime, stime, 0, 0, threads, 50_000),
                &io_file(1000, 500, 4096, 2048),
                children,
            );
            fs.add_file(
                format!("/proc/{}/smaps_rollup", pid),
                smaps_rollup(2000, 1500, 100),
            );
            fs.add_file(
                format!("/proc/{}/status", pid),
                format!("Name:\t{}\nPid:\t{}\nVmSize:\t  10000 kB\n", comm, pid),
            );
        }

        fs
    }

    /// Three fixture roots `/fixture/drop/{1,2,3}` for PID 1729 and device
    /// `eth0` whose monotonic counters go 500, 1000, 400 (times a scale).
    pub fn counter_drop() -> Self {
        let mut fs = Self::new();
        for (step, value) in [(1, 500u64), (2, 1000), (3, 400)] {
            let root = format!("/fixture/drop/{}", step);
            let base = format!("{}/proc/1729", root);
            fs.add_file(
                format!("{}/io", base),
                io_file(value, value * 2, value * 2, value * 2),
            );
            fs.add_file(
                format!("{}/stat", base),
                stat_line(1729, "job.sh", 1, value, value / 5, 0, 0, 1, 50_000),
            );
            fs.add_file(format!("{}/proc/uptime", root), "1000.00 3500.00\n");
            let stats = format!("{}/sys/class/net/eth0/statistics", root);
            fs.add_file(format!("{}/rx_bytes", stats), (value * 1000).to_string());
            fs.add_file(format!("{}/rx_packets", stats), (value * 2).to_string());
            fs.add_file(format!("{}/tx_bytes", stats), (value * 2000).to_string());
            fs.add_file(format!("{}/tx_packets", stats), (value * 4).to_string());
        }
        fs
    }

    /// Network counters for `eth0` and `lo` under `/sys/class/net`.
    pub fn net_devices() -> Self {
        let mut fs = Self::new();
        for (dev, rx, tx) in [("eth0", 10_000u64, 4_000u64), ("lo", 500, 500)] {
            let stats = format!("/sys/class/net/{}/statistics", dev);
            fs.add_file(format!("{}/rx_bytes", stats), format!("{}\n", rx));
            fs.add_file(format!("{}/rx_packets", stats), format!("{}\n", rx / 100));
            fs.add_file(format!("{}/tx_bytes", stats), format!("{}\n", tx));
            fs.add_file(format!("{}/tx_packets", stats), format!("{}\n", tx / 100));
        }
        fs
    }

    /// A host exposing only the cgroup v1 hierarchy, with PID 1729 in
    /// `/batch/job42` for the cpu, memory and blkio controllers.
    pub fn cgroup_v1_host() -> Self {
        let mut fs = Self::new();
        fs.add_file(
            "/proc/1729/cgroup",
            "\
12:blkio:/batch/job42
11:memory:/batch/job42
5:cpu,cpuacct:/batch/job42
1:name=systemd:/batch/job42
",
        );
        let cpu = "/sys/fs/cgroup/cpu,cpuacct/batch/job42";
        fs.add_dir("/sys/fs/cgroup/cpu");
        fs.add_file(format!("{}/cpuacct.stat", cpu), "user 250\nsystem 50\n");
        fs.add_file(
            format!("{}/cpu.stat", cpu),
            "nr_periods 40\nnr_throttled 3\nthrottled_time 1500000\n",
        );
        fs.add_file(format!("{}/tasks", cpu), "1729\n1730\n1731\n");
        fs.add_file(format!("{}/cgroup.procs", cpu), "1729\n1730\n");

        let mem = "/sys/fs/cgroup/memory/batch/job42";
        fs.add_file(format!("{}/memory.usage_in_bytes", mem), "52428800\n");
        fs.add_file(
            format!("{}/memory.limit_in_bytes", mem),
            "9223372036854771712\n",
        );
        fs.add_file(
            format!("{}/memory.stat", mem),
            "\
cache 10485760
rss 20971520
total_active_anon 16777216
total_inactive_anon 4194304
total_active_file 8388608
total_inactive_file 2097152
total_pgfault 9000
total_pgmajfault 12
",
        );

        let blkio = "/sys/fs/cgroup/blkio/batch/job42";
        fs.add_file(
            format!("{}/blkio.throttle.io_service_bytes", blkio),
            "\
8:0 Read 4096
8:0 Write 8192
8:0 Sync 12288
8:0 Async 0
8:0 Total 12288
Total 12288
",
        );
        fs
    }

    /// A unified cgroup v2 host with PID 1729 in `/batch/job42`.
    pub fn cgroup_v2_host() -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/1729/cgroup", "0::/batch/job42\n");
        fs.add_file("/sys/fs/cgroup/cgroup.controllers", "cpu io memory pids\n");
        let base = "/sys/fs/cgroup/batch/job42";
        fs.add_file(
            format!("{}/cpu.stat", base),
            "\
usage_usec 3000000
user_usec 2500000
system_usec 500000
nr_periods 40
nr_throttled 3
throttled_usec 1500
",
        );
        fs.add_file(format!("{}/memory.current", base), "52428800\n");
        fs.add_file(format!("{}/memory.max", base), "max\n");
        fs.add_file(
            format!("{}/memory.stat", base),
            "\
anon 20971520
file 10485760
kernel 2097152
slab 1048576
pgfault 9000
pgmajfault 12
",
        );
        fs.add_file(
            format!("{}/io.stat", base),
            "\
8:0 rbytes=4096 wbytes=8192 rios=1 wios=2 dbytes=0 dios=0
259:0 rbytes=1024 wbytes=0 rios=1 wios=0 dbytes=0 dios=0
",
        );
        fs.add_file(format!("{}/cgroup.procs", base), "1729\n1730\n");
        fs.add_file(format!("{}/cgroup.threads", base), "1729\n1730\n1733\n");
        fs
    }
}
