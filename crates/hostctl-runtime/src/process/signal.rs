//! Liveness probes and signal delivery by PID.
//!
//! Used where no child handle is available: detached background workers
//! tracked across restarts, and PTY shells whose child lives on a blocking
//! waiter thread.

use std::io;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

pub use nix::sys::signal::Signal as ProcessSignal;

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Check whether a process with this PID exists, using the null signal.
///
/// `EPERM` means the process exists but belongs to someone else, so it
/// counts as alive.
pub fn pid_exists(pid: u32) -> bool {
    let Some(nix_pid) = to_pid(pid) else {
        return false;
    };
    match signal::kill(nix_pid, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

/// Deliver `sig` to `pid`.
///
/// # Returns
/// - `Ok(true)` if the signal was delivered
/// - `Ok(false)` if the process was already gone
/// - `Err` for any other failure (typically `EPERM`)
pub fn send_signal(pid: u32, sig: Signal) -> io::Result<bool> {
    let nix_pid = to_pid(pid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;
    match signal::kill(nix_pid, sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

/// Deliver `sig` to every process in the group led by `pgid`.
///
/// Detached workers run in their own group so helpers they fork die with them.
pub fn send_group_signal(pgid: u32, sig: Signal) -> io::Result<bool> {
    let nix_pid = to_pid(pgid)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pgid {pgid}")))?;
    match signal::killpg(nix_pid, sig) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(io::Error::other(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[test]
    fn pid_zero_and_overflow_are_never_alive() {
        assert!(!pid_exists(0));
        assert!(!pid_exists(u32::MAX));
        assert!(send_signal(0, Signal::SIGKILL).is_err());
    }

    #[test]
    fn missing_pid_reports_gone() {
        // Linux caps pid_max at 4_194_304; macOS stays far below
        assert!(!pid_exists(4_194_304));
        assert!(!send_signal(4_194_304, Signal::SIGKILL).unwrap());
    }

    #[tokio::test]
    async fn kill_then_reap_makes_pid_disappear() {
        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("failed to spawn sleep");
        let pid = child.id().expect("no PID");
        assert!(pid_exists(pid));

        assert!(send_signal(pid, Signal::SIGKILL).unwrap());
        let _ = child.wait().await;

        assert!(!pid_exists(pid));
    }
}
