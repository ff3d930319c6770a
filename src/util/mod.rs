//! Utility modules for treemon.

mod command;

pub use command::{CommandOutput, run_command};

use std::sync::LazyLock;

use nix::unistd::{SysconfVar, sysconf};

/// Kernel USER_HZ used when `sysconf` cannot report it.
const DEFAULT_CLK_TCK: u64 = 100;

/// Cached result of the `_SC_CLK_TCK` query.
static CLK_TCK: LazyLock<u64> = LazyLock::new(|| match sysconf(SysconfVar::CLK_TCK) {
    Ok(Some(ticks)) if ticks > 0 => ticks as u64,
    _ => DEFAULT_CLK_TCK,
});

/// Returns clock ticks per second (USER_HZ).
///
/// The result is cached after the first call.
pub fn clock_ticks() -> u64 {
    *CLK_TCK
}

/// Rounds to two decimal places for the JSON summary.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
