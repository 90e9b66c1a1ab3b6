mod builtins;
mod executor;
mod job_control;
mod jobs;
mod parser;
mod pipeline;
mod status;

use std::io::{self, Write};

use job_control::Terminal;
use jobs::JobTable;

fn main() {
    // At the prompt, Ctrl-C just gives the user a fresh line. While a
    // foreground job runs it owns the terminal, so the interrupt goes
    // to the job's process group and never reaches the shell.
    ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    })
    .expect("Failed to set Ctrl-C handler");

    if let Err(e) = job_control::ensure_own_process_group() {
        eprintln!("marsh: setpgid: {e}");
    }
    if let Err(e) = job_control::ignore_job_control_signals() {
        eprintln!("marsh: signal setup: {e}");
    }

    let terminal = Terminal::new().unwrap_or_else(|e| {
        eprintln!("marsh: terminal setup: {e}");
        Terminal::detached()
    });

    let mut table = JobTable::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut last_exit_code: i32 = 0;

    loop {
        // Safe point: fold in pending child-state changes and announce
        // background transitions before showing the prompt.
        table.drain();
        table.report_changes(&mut stdout);

        print!("# ");
        if stdout.flush().is_err() {
            break;
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("marsh: error reading input: {e}");
                break;
            }
        }

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parsed = match parser::parse(trimmed) {
            Ok(Some(p)) => p,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("marsh: {msg}");
                last_exit_code = 2;
                continue;
            }
        };

        // Job-control builtins run inside the shell, but only as a plain
        // foreground command; in a pipeline or with `&` the words go
        // through the normal launch path like any external program.
        if parsed.stages.len() == 1
            && !parsed.background
            && builtins::is_builtin(&parsed.stages[0].argv[0])
        {
            let argv = &parsed.stages[0].argv;
            match builtins::execute(&argv[0], &argv[1..], &mut table, &terminal, &mut stdout) {
                builtins::BuiltinAction::Continue(code) => last_exit_code = code,
                builtins::BuiltinAction::Exit => break,
            }
            continue;
        }

        match pipeline::build(&parsed) {
            Ok(plan) => {
                last_exit_code = executor::run(plan, &mut table, &terminal, &mut stdout);
            }
            Err(e) => {
                // A failed redirection aborts the pipeline before any
                // stage spawns; no job is created.
                eprintln!("marsh: {e}");
                last_exit_code = 1;
            }
        }
    }

    shutdown(&mut table, &mut stdout);
    std::process::exit(last_exit_code);
}

/// End of session: kill whatever is still running, wait for every job
/// to finish, and report the final transitions.
fn shutdown(table: &mut JobTable, out: &mut dyn Write) {
    table.drain();
    for id in table.live_ids() {
        if let Some(job) = table.get(id) {
            if job.pgid > 0 {
                let _ = job_control::signal_group(job.pgid, libc::SIGTERM);
                // Stopped jobs only see the SIGTERM once continued.
                let _ = job_control::signal_group(job.pgid, libc::SIGCONT);
            }
        }
    }

    while table.has_live_jobs() {
        match job_control::wait_child_change() {
            Ok(Some((pid, raw))) => {
                if let Some(st) = status::decode_wait_status(raw) {
                    table.record_wait(pid, st);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    table.report_changes(out);
    let _ = out.flush();
}
