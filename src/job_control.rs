use std::io;

/// Move `pid` into process group `pgid` (its own group when `pgid` is 0).
///
/// Called from both the shell and, via `pre_exec`, the child itself, so
/// whichever runs first wins and the group exists before anyone signals it.
pub(crate) fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; the other side of the race has won.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Signals the shell keeps ignored while interactive; children must run
/// them at default disposition.
const JOB_CONTROL_SIGNALS: [libc::c_int; 3] = [libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU];

pub(crate) fn ignore_job_control_signals() -> io::Result<()> {
    for sig in JOB_CONTROL_SIGNALS {
        if unsafe { libc::signal(sig, libc::SIG_IGN) } == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Restore default dispositions in a child about to exec. Only
/// async-signal-safe calls; runs between fork and exec.
pub(crate) fn restore_default_dispositions() -> io::Result<()> {
    for sig in [libc::SIGINT, libc::SIGQUIT, libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU] {
        if unsafe { libc::signal(sig, libc::SIG_DFL) } == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Put the shell in its own process group unless it already leads one
/// (e.g. when it is the session leader on a fresh terminal).
pub(crate) fn ensure_own_process_group() -> io::Result<()> {
    let sid = unsafe { libc::getsid(0) };
    let pgid = unsafe { libc::getpgid(0) };
    if sid != pgid {
        set_process_group(0, 0)?;
    }
    Ok(())
}

/// Deliver `signal` to every process in group `pgid`.
pub(crate) fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Non-blocking check for one pending child state change.
///
/// Returns `(pid, raw_status)` for an exited/signaled/stopped/continued
/// child, or `None` when nothing is pending (or no children exist).
/// Callers drain by looping until `None`.
pub(crate) fn poll_child_change() -> io::Result<Option<(libc::pid_t, libc::c_int)>> {
    wait_common(libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED)
}

/// Block until some child changes state. `None` means there are no
/// children left to wait for.
pub(crate) fn wait_child_change() -> io::Result<Option<(libc::pid_t, libc::c_int)>> {
    wait_common(libc::WUNTRACED | libc::WCONTINUED)
}

fn wait_common(options: libc::c_int) -> io::Result<Option<(libc::pid_t, libc::c_int)>> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(-1, &mut raw_status, options) };
        if rc > 0 {
            return Ok(Some((rc, raw_status)));
        }
        if rc == 0 {
            return Ok(None);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            Some(code) if code == libc::ECHILD => return Ok(None),
            _ => return Err(err),
        }
    }
}

/// The shell's handle on its controlling terminal.
///
/// The fd is a duplicate of stdin with close-on-exec set, so jobs never
/// inherit it. When stdin is not a terminal (tests, piped input), all
/// ownership operations become no-ops and the shell still works.
pub(crate) struct Terminal {
    tty_fd: Option<libc::c_int>,
    shell_pgid: libc::pid_t,
    saved_modes: Option<libc::termios>,
}

impl Terminal {
    pub(crate) fn new() -> io::Result<Self> {
        let shell_pgid = unsafe { libc::getpgrp() };

        if unsafe { libc::isatty(libc::STDIN_FILENO) } != 1 {
            return Ok(Self {
                tty_fd: None,
                shell_pgid,
                saved_modes: None,
            });
        }

        let fd = unsafe { libc::dup(libc::STDIN_FILENO) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        unsafe {
            libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
        }

        let term = Self {
            tty_fd: Some(fd),
            shell_pgid,
            saved_modes: read_modes(fd),
        };
        term.reclaim();
        Ok(term)
    }

    /// The raw tty fd for a child's `pre_exec`, `None` without a terminal.
    pub(crate) fn child_fd(&self) -> Option<libc::c_int> {
        self.tty_fd
    }

    /// A terminal handle with no terminal behind it, used when setup fails.
    pub(crate) fn detached() -> Self {
        Self {
            tty_fd: None,
            shell_pgid: unsafe { libc::getpgrp() },
            saved_modes: None,
        }
    }

    /// Hand terminal ownership to a job's process group.
    pub(crate) fn give_to(&self, pgid: libc::pid_t) -> io::Result<()> {
        match self.tty_fd {
            Some(fd) => set_terminal_foreground(fd, pgid),
            None => Ok(()),
        }
    }

    /// Take the terminal back for the shell and restore its saved modes.
    pub(crate) fn reclaim(&self) {
        if let Some(fd) = self.tty_fd {
            let _ = set_terminal_foreground(fd, self.shell_pgid);
            if let Some(modes) = &self.saved_modes {
                unsafe {
                    libc::tcsetattr(fd, libc::TCSADRAIN, modes);
                }
            }
        }
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if let Some(fd) = self.tty_fd {
            unsafe {
                libc::close(fd);
            }
        }
    }
}

/// Scoped terminal handover: gives the terminal to `pgid` on creation
/// and returns it to the shell when dropped, on every exit path of the
/// foreground wait.
pub(crate) struct ForegroundGuard<'a> {
    terminal: &'a Terminal,
}

impl<'a> ForegroundGuard<'a> {
    pub(crate) fn new(terminal: &'a Terminal, pgid: libc::pid_t) -> io::Result<Self> {
        terminal.give_to(pgid)?;
        Ok(Self { terminal })
    }
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        self.terminal.reclaim();
    }
}

/// Make the calling process's own group the terminal's foreground
/// group. Runs between fork and exec; only async-signal-safe calls, and
/// the caller must still hold the stop signals ignored so `tcsetpgrp`
/// cannot stop it.
pub(crate) fn claim_terminal_from_child(fd: libc::c_int) -> io::Result<()> {
    let pgid = unsafe { libc::getpgrp() };
    set_terminal_foreground(fd, pgid)
}

fn read_modes(fd: libc::c_int) -> Option<libc::termios> {
    let mut modes = std::mem::MaybeUninit::<libc::termios>::uninit();
    if unsafe { libc::tcgetattr(fd, modes.as_mut_ptr()) } == 0 {
        Some(unsafe { modes.assume_init() })
    } else {
        None
    }
}

fn set_terminal_foreground(fd: libc::c_int, pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}
