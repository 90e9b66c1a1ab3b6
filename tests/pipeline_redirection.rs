use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_marsh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn marsh");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "quit").expect("write quit");
    }

    child.wait_with_output().expect("wait output")
}

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("marsh-{tag}-{}", std::process::id()))
}

#[test]
fn pipeline_passes_bytes_through() {
    let output = run_shell(&["echo hello | cat"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello"), "stdout was: {stdout}");
}

#[test]
fn long_pipeline_counts_matches() {
    let output = run_shell(&["echo LIST | cat | grep LIST | cat | wc -l"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.lines().any(|l| l.trim() == "1"),
        "stdout was: {stdout}"
    );
}

#[test]
fn output_redirection_roundtrips_through_a_file() {
    let path = temp_path("roundtrip");
    let path_str = path.to_str().unwrap();

    let write_line = format!("echo hi > {path_str}");
    let read_line = format!("cat < {path_str}");
    let output = run_shell(&[&write_line, &read_line]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("hi"), "stdout was: {stdout}");
    assert_eq!(std::fs::read(&path).unwrap(), b"hi\n");

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn input_redirection_matches_piped_content() {
    let path = temp_path("wc-equiv");
    let path_str = path.to_str().unwrap();
    std::fs::write(&path, "a\n".repeat(17)).unwrap();

    let redirected = format!("wc -l < {path_str}");
    let named = format!("wc -l {path_str}");
    let output = run_shell(&[&redirected, &named]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    // `wc -l < file` and `wc -l file` must agree on the count.
    assert!(
        stdout.lines().any(|l| l.trim() == "17"),
        "stdout was: {stdout}"
    );
    assert!(
        stdout.lines().any(|l| l.trim().starts_with("17 ")),
        "stdout was: {stdout}"
    );

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn redirection_into_pipeline_edges() {
    let path = temp_path("edges");
    let path_str = path.to_str().unwrap();
    std::fs::write(&path, "LIST one\nother\nLIST two\n").unwrap();

    let line = format!("cat < {path_str} | grep LIST | wc -l");
    let output = run_shell(&[&line]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.lines().any(|l| l.trim() == "2"),
        "stdout was: {stdout}"
    );

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn missing_input_file_aborts_before_spawning_any_stage() {
    let output = run_shell(&["cat < /no/such/marsh-file | wc -l", "echo ALIVE"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(stderr.contains("/no/such/marsh-file"), "stderr was: {stderr}");
    // wc never ran, so no stray "0" count appears.
    assert!(
        !stdout.lines().any(|l| l.trim() == "0"),
        "stdout was: {stdout}"
    );
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

#[test]
fn command_not_found_does_not_abort_pipeline_siblings() {
    let output = run_shell(&["no-such-marsh-cmd | cat", "echo ALIVE"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        stderr.contains("command not found: no-such-marsh-cmd"),
        "stderr was: {stderr}"
    );
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

#[cfg(target_os = "linux")]
#[test]
fn single_command_sees_only_its_own_descriptors() {
    let output = run_shell(&["ls /proc/self/fd"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let fds: Vec<usize> = stdout
        .split_whitespace()
        .filter_map(|w| w.parse().ok())
        .collect();
    // 0-2 plus the descriptor ls uses to read the directory.
    assert_eq!(fds, vec![0, 1, 2, 3], "stdout was: {stdout}");
}

#[cfg(target_os = "linux")]
#[test]
fn pipeline_stage_sees_no_descriptors_from_other_stages() {
    let output = run_shell(&["ls /proc/self/fd | cat"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let fds: Vec<usize> = stdout
        .split_whitespace()
        .filter_map(|w| w.parse().ok())
        .collect();
    assert_eq!(fds, vec![0, 1, 2, 3], "stdout was: {stdout}");
}
