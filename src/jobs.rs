use std::io::Write;

use crate::job_control;
use crate::status;

/// The lifecycle state of one tracked process.
///
/// `Exited` and `Signaled` are terminal: once set, later notifications
/// for the same pid are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcStatus {
    Running,
    Stopped,
    Exited(i32),
    Signaled(i32),
}

impl ProcStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcStatus::Exited(_) | ProcStatus::Signaled(_))
    }
}

/// One OS process belonging to a pipeline stage.
#[derive(Debug)]
pub struct Process {
    /// `None` when the stage never spawned (e.g. command not found).
    pub pid: Option<libc::pid_t>,
    pub status: ProcStatus,
}

impl Process {
    pub fn running(pid: libc::pid_t) -> Self {
        Self {
            pid: Some(pid),
            status: ProcStatus::Running,
        }
    }

    /// A stage that failed to launch, recorded with the conventional
    /// command-not-found exit status.
    pub fn failed() -> Self {
        Self {
            pid: None,
            status: ProcStatus::Exited(127),
        }
    }
}

/// Aggregate job state, always derived from the member processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Suspended,
    /// Every member is terminal; carries the last stage's status.
    Done(ProcStatus),
}

/// A single tracked job — one pipeline, one process group.
pub struct Job {
    pub id: usize,
    pub pgid: libc::pid_t,
    pub command: String,
    pub procs: Vec<Process>,
    pub foreground: bool,
    /// Last state announced to the user; transitions are reported when
    /// the derived state moves away from this.
    reported: JobState,
    /// Set once the terminal state has been reported; the job is purged
    /// right after.
    notified: bool,
}

impl Job {
    /// Derive the aggregate state: running wins over suspended, and a
    /// job is done only when every member process is terminal. The done
    /// status is the pipeline's last stage's.
    pub fn state(&self) -> JobState {
        if self.procs.iter().any(|p| p.status == ProcStatus::Running) {
            return JobState::Running;
        }
        if self.procs.iter().any(|p| p.status == ProcStatus::Stopped) {
            return JobState::Suspended;
        }
        let last = self
            .procs
            .last()
            .map(|p| p.status)
            .unwrap_or(ProcStatus::Exited(0));
        JobState::Done(last)
    }

    pub fn mark_reported(&mut self, state: JobState) {
        self.reported = state;
        if matches!(state, JobState::Done(_)) {
            self.notified = true;
        }
    }

    fn write_transition(&self, state: JobState, out: &mut dyn Write) {
        match state {
            JobState::Running => {
                let _ = writeln!(out, "[{}] continue '{}'", self.id, self.command);
            }
            JobState::Suspended => {
                let _ = writeln!(out, "[{}] suspended '{}'", self.id, self.command);
            }
            JobState::Done(ProcStatus::Exited(code)) => {
                let _ = writeln!(out, "[{}] exited '{}', status={}", self.id, self.command, code);
            }
            JobState::Done(ProcStatus::Signaled(signal)) => {
                let _ = writeln!(out, "[{}] killed '{}' by signal {}", self.id, self.command, signal);
            }
            JobState::Done(_) => {}
        }
    }
}

/// The shell's job table — the one registry shared by the launcher, the
/// reaper passes and the job-control commands. Jobs are kept in id
/// order; ids are handed out sequentially from 1 and never reused
/// within a session. A foreground launch is unnumbered (id 0) and only
/// takes the next id when its first suspension moves it to the
/// background, so foreground commands that simply run to completion
/// never consume an id.
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a freshly launched job. Background jobs get the next
    /// sequential id; a foreground job stays unnumbered (id 0) until
    /// `number_job` promotes it. Returns the id (0 for foreground).
    pub fn add(
        &mut self,
        pgid: libc::pid_t,
        command: String,
        procs: Vec<Process>,
        foreground: bool,
    ) -> usize {
        let id = if foreground {
            // Only one unnumbered job can exist; drop any stale handle
            // left by an aborted foreground wait.
            self.jobs.retain(|j| j.id != 0);
            0
        } else {
            let id = self.next_id;
            self.next_id += 1;
            id
        };
        self.jobs.push(Job {
            id,
            pgid,
            command,
            procs,
            foreground,
            reported: JobState::Running,
            notified: false,
        });
        id
    }

    /// Give an unnumbered foreground job its sequential id, on its
    /// first suspension. Already-numbered jobs keep their id.
    pub fn number_job(&mut self, id: usize) -> usize {
        if id != 0 {
            return id;
        }
        let numbered = self.next_id;
        let Some(job) = self.get_mut(0) else {
            return 0;
        };
        job.id = numbered;
        self.next_id += 1;
        numbered
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Highest-id job that has not finished — the default target for `fg`.
    pub fn current_job_id(&self) -> Option<usize> {
        self.jobs
            .iter()
            .rev()
            .find(|j| !matches!(j.state(), JobState::Done(_)))
            .map(|j| j.id)
    }

    /// Highest-id suspended job — the default target for `bg`.
    pub fn most_recent_suspended_id(&self) -> Option<usize> {
        self.jobs
            .iter()
            .rev()
            .find(|j| j.state() == JobState::Suspended)
            .map(|j| j.id)
    }

    /// Record one child-state notification. The pid is matched across
    /// all jobs; terminal statuses are never overwritten.
    pub fn record_wait(&mut self, pid: libc::pid_t, status: ProcStatus) {
        for job in &mut self.jobs {
            for proc in &mut job.procs {
                if proc.pid == Some(pid) {
                    if !proc.status.is_terminal() {
                        proc.status = status;
                    }
                    return;
                }
            }
        }
    }

    /// Apply all pending child-state deltas without blocking. Called at
    /// safe points only (before the prompt, at the start of the job
    /// commands), never from a signal context — a single call may
    /// consume state changes for any number of processes.
    pub fn drain(&mut self) {
        loop {
            match job_control::poll_child_change() {
                Ok(Some((pid, raw))) => {
                    if let Some(status) = status::decode_wait_status(raw) {
                        self.record_wait(pid, status);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    eprintln!("marsh: waitpid: {e}");
                    break;
                }
            }
        }
    }

    /// Announce every background job whose derived state moved since it
    /// was last reported, then purge jobs whose terminal report is out.
    /// Each terminal transition is reported exactly once.
    pub fn report_changes(&mut self, out: &mut dyn Write) {
        for job in &mut self.jobs {
            if job.foreground {
                continue;
            }
            let state = job.state();
            if state != job.reported {
                job.write_transition(state, out);
                job.mark_reported(state);
            }
        }
        self.purge_notified();
    }

    /// Render the `jobs` listing: every live job's current state in id
    /// order, plus the terminal line for any finished job that has not
    /// been reported yet. Reported finished jobs are purged.
    pub fn list(&mut self, out: &mut dyn Write) {
        for job in &mut self.jobs {
            let state = job.state();
            match state {
                JobState::Running => {
                    let _ = writeln!(out, "[{}] running '{}'", job.id, job.command);
                }
                JobState::Suspended => {
                    let _ = writeln!(out, "[{}] suspended '{}'", job.id, job.command);
                }
                JobState::Done(_) => {
                    if !job.notified {
                        job.write_transition(state, out);
                    }
                }
            }
            job.mark_reported(state);
        }
        self.purge_notified();
    }

    /// Drop a finished foreground job without a report line; its exit
    /// status has already been consumed by the foreground controller.
    pub fn remove_finished(&mut self, id: usize) {
        if let Some(job) = self.get_mut(id) {
            let state = job.state();
            job.mark_reported(state);
        }
        self.jobs.retain(|j| j.id != id);
    }

    fn purge_notified(&mut self) {
        self.jobs.retain(|j| !j.notified);
    }

    /// Ids of all jobs that still have live processes.
    pub fn live_ids(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .filter(|j| !matches!(j.state(), JobState::Done(_)))
            .map(|j| j.id)
            .collect()
    }

    pub fn has_live_jobs(&self) -> bool {
        !self.live_ids().is_empty()
    }
}
