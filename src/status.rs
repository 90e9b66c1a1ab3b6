use crate::jobs::ProcStatus;

/// Interpret a raw `waitpid` status into a process status.
///
/// Returns `None` for status words that carry no state change we track.
pub fn decode_wait_status(raw: libc::c_int) -> Option<ProcStatus> {
    if libc::WIFEXITED(raw) {
        return Some(ProcStatus::Exited(libc::WEXITSTATUS(raw)));
    }
    if libc::WIFSIGNALED(raw) {
        return Some(ProcStatus::Signaled(libc::WTERMSIG(raw)));
    }
    if libc::WIFSTOPPED(raw) {
        return Some(ProcStatus::Stopped);
    }
    if libc::WIFCONTINUED(raw) {
        return Some(ProcStatus::Running);
    }
    None
}

/// Shell-style exit code for a terminal process status.
///
/// Processes terminated by a signal map to `128 + signal`.
pub fn exit_code(status: ProcStatus) -> i32 {
    match status {
        ProcStatus::Exited(code) => code,
        ProcStatus::Signaled(signal) => 128 + signal,
        ProcStatus::Running | ProcStatus::Stopped => 0,
    }
}
