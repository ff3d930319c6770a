//! Launching, liveness checks and reaping of the monitored process.

use std::io;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

/// Launches `argv` as a child and returns its PID.
///
/// The child inherits stdio. It is reaped by [`reap_children`], not by a
/// `Child` handle.
pub fn spawn_child(argv: &[String]) -> io::Result<u32> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty child command"))?;
    let child = Command::new(program).args(args).spawn()?;
    let pid = child.id();
    info!(pid, command = %argv.join(" "), "child launched");
    Ok(pid)
}

/// Whether `pid` still exists, by sending it signal 0.
///
/// A process we may not signal still exists.
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Shell-style exit code for a terminated child: its exit status, or
/// 128 + signal number. `None` for non-terminal states.
pub fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

/// Reaps every exited child without blocking.
///
/// Returns the exit code of `launched` if it was among them. Non-zero
/// exits and signal deaths are logged; errors other than "no children"
/// are logged and end the pass.
pub fn reap_children(launched: Option<u32>) -> Option<i32> {
    let mut launched_code = None;
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                let Some(pid) = status.pid() else {
                    break;
                };
                let Some(code) = exit_code(status) else {
                    debug!(pid = pid.as_raw(), ?status, "child changed state");
                    continue;
                };
                match status {
                    WaitStatus::Signaled(_, signal, _) => {
                        warn!(pid = pid.as_raw(), signal = signal.as_str(), "child killed by signal")
                    }
                    _ if code != 0 => warn!(pid = pid.as_raw(), code, "child exited with non-zero status"),
                    _ => debug!(pid = pid.as_raw(), "child exited"),
                }
                if launched.is_some_and(|l| l as i32 == pid.as_raw()) {
                    launched_code = Some(code);
                }
            }
            Err(Errno::ECHILD) => break,
            Err(e) => {
                warn!(error = %e, "waitpid failed");
                break;
            }
        }
    }
    launched_code
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    #[test]
    fn test_exit_code() {
        let pid = Pid::from_raw(100);
        assert_eq!(exit_code(WaitStatus::Exited(pid, 0)), Some(0));
        assert_eq!(exit_code(WaitStatus::Exited(pid, 3)), Some(3));
        assert_eq!(
            exit_code(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            Some(137)
        );
        assert_eq!(exit_code(WaitStatus::StillAlive), None);
        assert_eq!(exit_code(WaitStatus::Continued(pid)), None);
    }

    #[test]
    fn test_is_alive() {
        assert!(is_alive(std::process::id()));
        assert!(!is_alive(i32::MAX as u32));
        assert!(!is_alive(u32::MAX));
    }

    #[test]
    fn test_spawn_child_errors() {
        assert_eq!(
            spawn_child(&[]).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert!(spawn_child(&["treemon-no-such-program-xyz".to_string()]).is_err());
    }
}
