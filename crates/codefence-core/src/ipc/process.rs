//! Process-tree control for workers and the interpreters they spawn.
//!
//! A worker leads its own process group, and every interpreter it starts
//! inherits that group. Tearing a context down kills the whole group, so a
//! run that is still executing dies with its worker.

use tokio::process::Command;

/// Start `command` as the leader of a new process group.
pub(crate) fn new_process_group(command: &mut Command) {
    #[cfg(unix)]
    command.process_group(0);
    #[cfg(not(unix))]
    let _ = command;
}

/// SIGKILL every process in the group led by `leader`.
pub(crate) fn kill_process_group(leader: u32) {
    #[cfg(unix)]
    {
        let Ok(pgid) = i32::try_from(leader) else {
            return;
        };
        // A negative pid addresses the whole group
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(
                "Process group {} already gone: {}",
                leader,
                std::io::Error::last_os_error()
            );
        }
    }
    #[cfg(not(unix))]
    let _ = leader;
}

/// Have the kernel SIGKILL the spawned process when its parent exits.
///
/// Covers the case where the worker dies without the host tearing the
/// group down. Linux only; elsewhere the group kill is the only release.
pub(crate) fn kill_with_parent(command: &mut Command) {
    #[cfg(target_os = "linux")]
    {
        let set_death_signal = || {
            let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong) };
            if rc == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        };
        // prctl is async-signal-safe, so it may run between fork and exec
        unsafe {
            command.pre_exec(set_death_signal);
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = command;
}
