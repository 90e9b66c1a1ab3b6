use std::fs::File;
use std::io;
use std::process::Stdio;

use crate::parser::Pipeline;

/// One stage of a resolved launch plan. A `None` binding means the
/// stage inherits the shell's own stream.
#[derive(Debug)]
pub struct StagePlan {
    pub argv: Vec<String>,
    pub stdin: Option<Stdio>,
    pub stdout: Option<Stdio>,
}

/// A fully resolved execution plan: argv and descriptor bindings for
/// every stage, ready to spawn.
///
/// All descriptors — pipe ends and redirection files — are owned
/// handles. A handle given to a child is consumed by the spawn; every
/// other copy closes when its owner drops, on success and failure paths
/// alike, so no stage (and not the shell) retains plumbing it does not
/// need. Pipes are close-on-exec, keeping them out of non-adjacent
/// stages entirely.
#[derive(Debug)]
pub struct LaunchPlan {
    pub stages: Vec<StagePlan>,
    pub background: bool,
    pub command: String,
}

/// Resolve a parsed pipeline into a launch plan.
///
/// Stage `i` reads from stage `i-1`'s pipe and writes to stage `i+1`'s,
/// unless an explicit redirection overrides that end. `> file` creates
/// or truncates; `< file` must already exist — any open failure aborts
/// the whole pipeline before a single process is spawned.
pub fn build(pipeline: &Pipeline) -> io::Result<LaunchPlan> {
    let mut stages: Vec<StagePlan> = Vec::with_capacity(pipeline.stages.len());

    for stage in &pipeline.stages {
        let stdin = match &stage.stdin_file {
            Some(path) => Some(Stdio::from(open_input(path)?)),
            None => None,
        };
        let stdout = match &stage.stdout_file {
            Some(path) => Some(Stdio::from(create_output(path)?)),
            None => None,
        };
        stages.push(StagePlan {
            argv: stage.argv.clone(),
            stdin,
            stdout,
        });
    }

    for i in 0..stages.len().saturating_sub(1) {
        let (reader, writer) = os_pipe::pipe()?;
        // A redirection on either side wins; the losing pipe end drops
        // closed here and the neighbor sees EOF / EPIPE.
        if stages[i].stdout.is_none() {
            stages[i].stdout = Some(Stdio::from(writer));
        }
        if stages[i + 1].stdin.is_none() {
            stages[i + 1].stdin = Some(Stdio::from(reader));
        }
    }

    Ok(LaunchPlan {
        stages,
        background: pipeline.background,
        command: pipeline.command_text(),
    })
}

fn open_input(path: &str) -> io::Result<File> {
    File::open(path).map_err(|e| io::Error::new(e.kind(), format!("{path}: {e}")))
}

fn create_output(path: &str) -> io::Result<File> {
    File::create(path).map_err(|e| io::Error::new(e.kind(), format!("{path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn parsed(line: &str) -> Pipeline {
        parser::parse(line).unwrap().unwrap()
    }

    #[test]
    fn single_stage_inherits_both_ends() {
        let plan = build(&parsed("ls -l")).unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert!(plan.stages[0].stdin.is_none());
        assert!(plan.stages[0].stdout.is_none());
        assert_eq!(plan.command, "ls -l");
    }

    #[test]
    fn pipeline_connects_adjacent_stages() {
        let plan = build(&parsed("echo hi | cat | wc -l")).unwrap();
        assert!(plan.stages[0].stdin.is_none());
        assert!(plan.stages[0].stdout.is_some());
        assert!(plan.stages[1].stdin.is_some());
        assert!(plan.stages[1].stdout.is_some());
        assert!(plan.stages[2].stdin.is_some());
        assert!(plan.stages[2].stdout.is_none());
    }

    #[test]
    fn missing_input_file_aborts_the_whole_pipeline() {
        let err = build(&parsed("wc -l < /no/such/marsh-file | cat")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("/no/such/marsh-file"));
    }

    #[test]
    fn output_redirection_creates_and_truncates() {
        let path = std::env::temp_dir().join(format!("marsh-plan-{}", std::process::id()));
        let path_str = path.to_str().unwrap();

        std::fs::write(&path, "old contents\n").unwrap();
        let plan = build(&parsed(&format!("echo hi > {path_str}"))).unwrap();
        assert!(plan.stages[0].stdout.is_some());
        // create/truncate semantics: the old contents are gone already.
        assert_eq!(std::fs::read(&path).unwrap(), b"");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn background_flag_and_command_text_carry_over() {
        let plan = build(&parsed("sleep 1000 &")).unwrap();
        assert!(plan.background);
        assert_eq!(plan.command, "sleep 1000");
    }
}
