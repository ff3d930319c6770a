//! Parsers for the Linux `/proc` filesystem.
//!
//! This module provides pure parsers for the per-process and system-wide
//! files the probes and the tree discovery read from `/proc`.

pub mod parser;

pub use parser::{
    CpuTopology, ParseError, ProcIo, ProcStat, SmapsTotals, parse_children, parse_cpuinfo,
    parse_meminfo_total, parse_proc_io, parse_proc_stat, parse_smaps, parse_status_vmsize,
    parse_uptime,
};
