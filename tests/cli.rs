//! End-to-end tests of the `taskrun` binary.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use taskrun::process::{exit_code, is_alive, send_signal};
use tempfile::TempDir;

fn taskrun() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_taskrun"));
    cmd.env_remove("TASKRUN_CONFIG")
        .env_remove("TASKRUN_WRAPPER")
        .env_remove("TASKRUN_WATCHDOG")
        .env("TASKRUN_NO_WATCHDOG", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    taskrun().args(args).output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8(output.stderr.clone()).unwrap()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("process did not exit within {:?}", timeout);
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn run_forwards_output_and_exit_code() {
    let output = run(&["run", "--", "sh", "-c", "echo out; echo err >&2; exit 5"]);
    assert_eq!(output.status.code(), Some(5));
    assert_eq!(stdout(&output), "out\n");
    assert_eq!(stderr(&output), "err\n");
}

#[test]
fn run_pipeline_prints_only_last_stage_stdout() {
    let output = run(&["run", "--pipe", "grep b", "--", "printf", r"a\nb\nc\n"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "b\n");
}

#[test]
fn run_three_stage_pipeline() {
    let output = run(&[
        "run",
        "--pipe",
        "sort -r",
        "--pipe",
        "head -n 1",
        "--",
        "printf",
        r"x\nz\ny\n",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "z\n");
}

#[test]
fn run_applies_dir_and_env() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("marker.txt"), "").unwrap();

    let dir = temp_dir.path().to_str().unwrap();
    let output = run(&[
        "run",
        "-C",
        dir,
        "-e",
        "GREETING=hello",
        "--",
        "sh",
        "-c",
        "ls; echo $GREETING",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "marker.txt\nhello\n");
}

#[test]
fn run_of_stdin_reader_does_not_wait_for_host_input() {
    // The host's own stdin stays open; the child must not inherit it.
    let mut host = taskrun()
        .args(["run", "--pipe", "wc -l", "--", "sort"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let status = wait_with_timeout(&mut host, Duration::from_secs(10));
    assert!(status.success());
    let mut line = String::new();
    BufReader::new(host.stdout.take().unwrap())
        .read_line(&mut line)
        .unwrap();
    assert_eq!(line.trim(), "0");
}

#[test]
fn capture_prints_output_after_run() {
    let output = run(&["run", "--capture", "--", "sh", "-c", "echo out; echo err >&2"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "out\n");
    assert_eq!(stderr(&output), "err\n");
}

#[test]
fn capture_of_binary_output_is_decode_failure() {
    let output = run(&["run", "--capture", "--", "printf", r"\377"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("not valid UTF-8"));
}

#[test]
fn async_run_reports_exit_code() {
    let output = run(&["run", "--async", "--", "sh", "-c", "echo a; exit 3"]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout(&output), "a\n");
}

#[test]
fn describe_prints_pipeline() {
    let output = run(&["describe", "--pipe", "wc -l", "--", "cat", "my file"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "cat 'my file' | wc -l\n");
}

#[test]
fn exit_on_failure_terminates_host_with_child_code() {
    let output = run(&["run", "--exit-on-failure", "--", "sh", "-c", "echo before; exit 2"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout(&output), "before\n");
    assert!(stderr(&output).contains("Error: command 'sh' failed with exit code 2"));
}

#[test]
fn missing_wrapper_is_spawn_failure() {
    let output = taskrun()
        .env("TASKRUN_WRAPPER", "/nonexistent/taskrun-wrapper")
        .args(["run", "--", "true"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("failed to launch 'true'"));
}

#[test]
fn invalid_config_file_is_config_failure() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("taskrun.yaml");
    std::fs::write(&config, "read_chunk_size: 0\n").unwrap();

    let output = run(&["--config", config.to_str().unwrap(), "run", "--", "true"]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn sigterm_is_forwarded_to_child() {
    let mut host = taskrun()
        .args(["run", "--", "sh", "-c", "echo ready; exec sleep 30"])
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    // The trap is installed before the child is spawned.
    let mut line = String::new();
    BufReader::new(host.stdout.take().unwrap())
        .read_line(&mut line)
        .unwrap();
    assert_eq!(line, "ready\n");

    send_signal(host.id(), libc::SIGTERM).unwrap();
    let status = wait_with_timeout(&mut host, Duration::from_secs(10));
    assert_eq!(exit_code(status), 128 + libc::SIGTERM);
}

#[test]
fn watchdog_kills_child_of_sigkilled_host() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("taskrun.yaml");
    std::fs::write(
        &config,
        format!(
            "watchdog: {}\nwatchdog_poll_ms: 50\nkill_grace_ms: 200\n",
            env!("CARGO_BIN_EXE_taskrun-watchdog")
        ),
    )
    .unwrap();

    let mut host = taskrun()
        .env_remove("TASKRUN_NO_WATCHDOG")
        .args(["--config", config.to_str().unwrap()])
        .args(["run", "--", "sh", "-c", "echo $$; exec sleep 30"])
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let mut line = String::new();
    BufReader::new(host.stdout.take().unwrap())
        .read_line(&mut line)
        .unwrap();
    let child_pid: u32 = line.trim().parse().unwrap();
    assert!(is_alive(child_pid));

    host.kill().unwrap();
    host.wait().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while is_alive(child_pid) {
        assert!(
            Instant::now() < deadline,
            "child {} outlived its host",
            child_pid
        );
        thread::sleep(Duration::from_millis(50));
    }
}
