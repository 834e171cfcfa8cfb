//! Process-group signalling

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// Send `signal` to every process in group `pgid`; `None` only checks that the group exists.
///
/// Returns `Ok(false)` when the group no longer exists.
pub fn signal_group(pgid: u32, signal: impl Into<Option<Signal>>) -> nix::Result<bool> {
    match killpg(Pid::from_raw(pgid as i32), signal.into()) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether any process (zombies included) is left in group `pgid`
pub fn group_exists(pgid: u32) -> bool {
    !matches!(signal_group(pgid, None), Ok(false))
}

/// Whether `pid` is still running. A zombie waiting for its reaper is not.
pub fn process_exists(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // state is the first field after the parenthesised command name
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

/// Exit code, with signal deaths reported as `128 + signal`
pub fn exit_code_of(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}
