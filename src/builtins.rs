use std::io::Write;

use crate::executor;
use crate::job_control::{self, Terminal};
use crate::jobs::{JobState, JobTable};

/// The job-control builtins. Everything else on a command line is an
/// external program.
const BUILTINS: &[&str] = &["jobs", "fg", "bg", "kill", "quit"];

#[derive(Debug)]
pub enum BuiltinAction {
    Continue(i32),
    Exit,
}

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Execute a builtin command. Returns the action for the main loop.
pub fn execute(
    program: &str,
    args: &[String],
    table: &mut JobTable,
    terminal: &Terminal,
    out: &mut dyn Write,
) -> BuiltinAction {
    match program {
        "jobs" => {
            table.drain();
            table.list(out);
            BuiltinAction::Continue(0)
        }
        "fg" => BuiltinAction::Continue(builtin_fg(args, table, terminal, out)),
        "bg" => BuiltinAction::Continue(builtin_bg(args, table, terminal, out)),
        "kill" => BuiltinAction::Continue(builtin_kill(args, table)),
        "quit" => BuiltinAction::Exit,
        _ => {
            eprintln!("marsh: unknown builtin: {program}");
            BuiltinAction::Continue(1)
        }
    }
}

/// Bring a job to the foreground, resuming it if stopped. With no
/// argument, targets the most recent job that has not finished.
fn builtin_fg(
    args: &[String],
    table: &mut JobTable,
    terminal: &Terminal,
    out: &mut dyn Write,
) -> i32 {
    table.drain();
    let Some(id) = resolve_job_id(args.first(), table.current_job_id()) else {
        return 1;
    };
    executor::resume(table, id, true, terminal, out)
}

/// Resume a stopped job in the background. With no argument, targets
/// the most recently suspended job.
fn builtin_bg(
    args: &[String],
    table: &mut JobTable,
    terminal: &Terminal,
    out: &mut dyn Write,
) -> i32 {
    table.drain();
    let Some(id) = resolve_job_id(args.first(), table.most_recent_suspended_id()) else {
        return 1;
    };
    executor::resume(table, id, false, terminal, out)
}

/// Stop signals must not be chased by SIGCONT, or the stop is undone
/// before it lands.
const STOP_SIGNALS: [libc::c_int; 4] =
    [libc::SIGSTOP, libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU];

/// `kill [-SIG] %n`: signal a job's whole process group. The default
/// signal is SIGTERM; non-stop signals are chased by SIGCONT so a
/// stopped job can act on them. Never blocks; the resulting state
/// change is picked up by the next reap pass.
fn builtin_kill(args: &[String], table: &mut JobTable) -> i32 {
    let mut signal = libc::SIGTERM;
    let mut target: Option<&String> = None;

    for arg in args {
        if let Some(rest) = arg.strip_prefix('-') {
            match rest.parse::<libc::c_int>() {
                Ok(sig) if sig > 0 => signal = sig,
                _ => {
                    eprintln!("marsh: kill: invalid signal: {arg}");
                    return 1;
                }
            }
        } else {
            target = Some(arg);
        }
    }

    let Some(id) = resolve_job_id(target, None) else {
        eprintln!("marsh: usage: kill [-SIG] %job");
        return 1;
    };

    match table.get(id) {
        Some(job) if !matches!(job.state(), JobState::Done(_)) && job.pgid > 0 => {
            if let Err(e) = job_control::signal_group(job.pgid, signal) {
                eprintln!("marsh: kill: {e}");
                return 1;
            }
            if !STOP_SIGNALS.contains(&signal) {
                let _ = job_control::signal_group(job.pgid, libc::SIGCONT);
            }
            0
        }
        _ => {
            eprintln!("marsh: kill: %{id}: no such job");
            1
        }
    }
}

/// Parse a job id argument (accepts `%N` or `N`), falling back to
/// `default` when no argument is given.
fn resolve_job_id(arg: Option<&String>, default: Option<usize>) -> Option<usize> {
    match arg {
        Some(s) => match s.trim_start_matches('%').parse::<usize>() {
            Ok(id) => Some(id),
            Err(_) => {
                eprintln!("marsh: invalid job id: {s}");
                None
            }
        },
        None => {
            if default.is_none() {
                eprintln!("marsh: no current job");
            }
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Process;

    #[test]
    fn builtin_names() {
        for name in ["jobs", "fg", "bg", "kill", "quit"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("cat"));
        assert!(!is_builtin("pkill"));
    }

    #[test]
    fn job_id_accepts_percent_form() {
        assert_eq!(resolve_job_id(Some(&"%3".to_string()), None), Some(3));
        assert_eq!(resolve_job_id(Some(&"3".to_string()), None), Some(3));
        assert_eq!(resolve_job_id(Some(&"%x".to_string()), None), None);
        assert_eq!(resolve_job_id(None, Some(2)), Some(2));
        assert_eq!(resolve_job_id(None, None), None);
    }

    #[test]
    fn kill_unknown_job_is_an_error_without_state_change() {
        let mut table = JobTable::new();
        table.add(50, "sleep 9".into(), vec![Process::running(50)], false);

        let code = builtin_kill(&["%7".to_string()], &mut table);
        assert_eq!(code, 1);
        assert_eq!(table.get(1).unwrap().state(), JobState::Running);
    }

    #[test]
    fn kill_rejects_bad_signal() {
        let mut table = JobTable::new();
        assert_eq!(builtin_kill(&["-x".to_string(), "%1".to_string()], &mut table), 1);
        assert_eq!(builtin_kill(&[], &mut table), 1);
    }
}
