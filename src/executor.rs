use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::Command;

use crate::job_control::{self, ForegroundGuard, Terminal};
use crate::jobs::{JobState, JobTable, ProcStatus, Process};
use crate::pipeline::LaunchPlan;
use crate::status;

/// Spawn every stage of the plan into one fresh process group and
/// register the resulting job.
///
/// Foreground jobs hand the terminal over and block until the job
/// finishes or stops; background jobs print their running notice and
/// return immediately. Returns the exit code (0 for background).
pub fn run(
    plan: LaunchPlan,
    table: &mut JobTable,
    terminal: &Terminal,
    out: &mut dyn Write,
) -> i32 {
    let mut pgid: libc::pid_t = 0;
    let mut procs = Vec::with_capacity(plan.stages.len());
    let fg_tty = if plan.background {
        None
    } else {
        terminal.child_fd()
    };

    for stage in plan.stages {
        let mut cmd = Command::new(&stage.argv[0]);
        cmd.args(&stage.argv[1..]);
        if let Some(stdin) = stage.stdin {
            cmd.stdin(stdin);
        }
        if let Some(stdout) = stage.stdout {
            cmd.stdout(stdout);
        }

        // The first stage leads the group (setpgid pgid argument 0);
        // later stages join it. A foreground leader also claims the
        // terminal for its new group right away, so a job that reads
        // the tty immediately cannot take SIGTTIN before the shell's
        // own handover lands. The child then resets the dispositions
        // the shell keeps ignored, so Ctrl-C / Ctrl-Z act on the job.
        let group = pgid;
        unsafe {
            cmd.pre_exec(move || {
                job_control::set_process_group(0, group)?;
                if group == 0 {
                    if let Some(fd) = fg_tty {
                        let _ = job_control::claim_terminal_from_child(fd);
                    }
                }
                job_control::restore_default_dispositions()?;
                Ok(())
            });
        }

        match cmd.spawn() {
            Ok(child) => {
                let pid = child.id() as libc::pid_t;
                // Race both sides of setpgid; the child may not have
                // run yet when we need the group to exist.
                let target = if pgid == 0 { pid } else { pgid };
                let _ = job_control::set_process_group(pid, target);
                if pgid == 0 {
                    pgid = pid;
                }
                procs.push(Process::running(pid));
            }
            Err(e) => {
                // One stage failing to launch does not abort its
                // siblings; the stage is recorded as exited with 127.
                if e.kind() == std::io::ErrorKind::NotFound {
                    eprintln!("marsh: command not found: {}", stage.argv[0]);
                } else {
                    eprintln!("marsh: {}: {e}", stage.argv[0]);
                }
                procs.push(Process::failed());
            }
        }
        // `cmd` drops here, closing the parent's copies of this stage's
        // pipe ends before the next stage spawns.
    }

    let command_text = plan.command.clone();
    let id = table.add(pgid, plan.command, procs, !plan.background);

    if plan.background {
        let _ = writeln!(out, "[{id}] running '{command_text}'");
        let _ = out.flush();
        0
    } else {
        wait_foreground(table, id, terminal, out)
    }
}

/// Foreground controller: block the shell until job `id` finishes or
/// stops, feeding every child-state change (background jobs included)
/// into the table along the way.
///
/// The terminal belongs to the job's process group for the whole wait
/// and reverts to the shell on every exit path.
pub fn wait_foreground(
    table: &mut JobTable,
    id: usize,
    terminal: &Terminal,
    out: &mut dyn Write,
) -> i32 {
    let pgid = table.get(id).map(|j| j.pgid).unwrap_or(0);
    let _guard = if pgid > 0 {
        ForegroundGuard::new(terminal, pgid).ok()
    } else {
        None
    };

    loop {
        let Some(job) = table.get(id) else {
            return 0;
        };
        match job.state() {
            JobState::Done(last) => {
                // Foreground completion is silent; the status becomes
                // the shell's last exit code.
                table.remove_finished(id);
                return status::exit_code(last);
            }
            JobState::Suspended => {
                // A freshly launched foreground job takes its id here,
                // as it moves into the background.
                let id = table.number_job(id);
                let Some(job) = table.get_mut(id) else {
                    return 0;
                };
                job.foreground = false;
                let _ = writeln!(out, "[{}] suspended '{}'", job.id, job.command);
                let _ = out.flush();
                job.mark_reported(JobState::Suspended);
                return 128 + libc::SIGTSTP;
            }
            JobState::Running => {}
        }

        match job_control::wait_child_change() {
            Ok(Some((pid, raw))) => {
                if let Some(st) = status::decode_wait_status(raw) {
                    table.record_wait(pid, st);
                }
            }
            Ok(None) => {
                // No children left anywhere, yet the job still reads as
                // running: its processes are gone, close them out.
                if let Some(job) = table.get_mut(id) {
                    for proc in &mut job.procs {
                        if proc.status == ProcStatus::Running {
                            proc.status = ProcStatus::Exited(0);
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("marsh: waitpid: {e}");
                return 1;
            }
        }
    }
}

/// Resume a stopped or background job: SIGCONT to its group, announce
/// the continuation, and — for `fg` — take it to the foreground and
/// wait on it.
pub fn resume(
    table: &mut JobTable,
    id: usize,
    to_foreground: bool,
    terminal: &Terminal,
    out: &mut dyn Write,
) -> i32 {
    let Some(job) = table.get_mut(id) else {
        eprintln!("marsh: %{id}: no such job");
        return 1;
    };
    if matches!(job.state(), JobState::Done(_)) {
        eprintln!("marsh: %{id}: no such job");
        return 1;
    }

    let pgid = job.pgid;
    if pgid > 0 {
        if let Err(e) = job_control::signal_group(pgid, libc::SIGCONT) {
            eprintln!("marsh: %{id}: {e}");
            return 1;
        }
    }

    // The continue signal is on its way; count the stopped processes as
    // running now rather than blocking on the WCONTINUED notification.
    for proc in &mut job.procs {
        if proc.status == ProcStatus::Stopped {
            proc.status = ProcStatus::Running;
        }
    }
    job.foreground = to_foreground;
    job.mark_reported(JobState::Running);

    let _ = writeln!(out, "[{}] continue '{}'", job.id, job.command);
    let _ = out.flush();

    if to_foreground {
        wait_foreground(table, id, terminal, out)
    } else {
        0
    }
}
