//! `ManagedProcess` lifecycle: spawn, poll, wait, and bounded teardown.

#![cfg(unix)]

use std::time::{Duration, Instant};

use pantry_session::config::CommandSpec;
use pantry_session::orchestrator::child::{
    ManagedProcess, ProcessState, SpawnOptions, TeardownOutcome,
};
use pantry_session::AppError;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", &["-c", script])
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let result = ManagedProcess::spawn(
        "main_stage",
        &CommandSpec::new("/nonexistent/GUI", &[]),
        &SpawnOptions::capture(),
    );
    match result {
        Err(AppError::Spawn(msg)) => assert!(msg.contains("main_stage")),
        other => panic!("expected spawn error, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_reports_exit_code() {
    let mut process =
        ManagedProcess::spawn("job", &sh("exit 3"), &SpawnOptions::capture()).expect("spawn");
    assert_eq!(process.label(), "job");
    assert!(process.pid().is_some());

    let state = process.wait_blocking().await.expect("wait");

    assert_eq!(state, ProcessState::Exited(3));
    assert_eq!(state.code(), Some(3));
    assert_eq!(process.last_state(), ProcessState::Exited(3));
    assert_eq!(process.pid(), None, "pid is cleared once reaped");
}

#[tokio::test]
async fn poll_is_non_blocking() {
    let mut process =
        ManagedProcess::spawn("job", &sh("sleep 0.2"), &SpawnOptions::capture()).expect("spawn");

    assert_eq!(process.poll().expect("poll"), ProcessState::Running);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = process.poll().expect("poll");
        if state.is_finished() {
            assert_eq!(state, ProcessState::Exited(0));
            break;
        }
        assert!(Instant::now() < deadline, "process never exited");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn teardown_of_exited_process_sends_nothing() {
    let mut process =
        ManagedProcess::spawn("job", &sh("exit 0"), &SpawnOptions::capture()).expect("spawn");
    process.wait_blocking().await.expect("wait");

    let outcome = process
        .terminate_and_wait(Duration::from_secs(1))
        .await
        .expect("teardown");

    assert_eq!(
        outcome,
        TeardownOutcome::AlreadyExited(ProcessState::Exited(0))
    );
}

#[tokio::test]
async fn teardown_terminates_within_grace() {
    let mut process =
        ManagedProcess::spawn("main_stage", &sh("exec sleep 30"), &SpawnOptions::capture())
            .expect("spawn");

    let started = Instant::now();
    let outcome = process
        .terminate_and_wait(Duration::from_secs(5))
        .await
        .expect("teardown");

    assert_eq!(outcome, TeardownOutcome::Graceful(ProcessState::Killed));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn teardown_force_kills_after_grace() {
    let mut process = ManagedProcess::spawn(
        "main_stage",
        &sh("trap '' TERM; echo ready; exec sleep 30"),
        &SpawnOptions::capture(),
    )
    .expect("spawn");
    // Let the shell install its trap before the request arrives.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let outcome = process
        .terminate_and_wait(Duration::from_millis(300))
        .await
        .expect("teardown");

    assert_eq!(outcome, TeardownOutcome::ForceKilled);
    assert_eq!(process.last_state(), ProcessState::Killed);
}

#[tokio::test]
async fn stderr_tail_is_kept_for_diagnostics() {
    let mut process = ManagedProcess::spawn(
        "job",
        &sh("echo first >&2; echo boom >&2; exit 1"),
        &SpawnOptions::capture(),
    )
    .expect("spawn");
    process.wait_blocking().await.expect("wait");

    let deadline = Instant::now() + Duration::from_secs(5);
    while process.recent_stderr().len() < 2 {
        assert!(Instant::now() < deadline, "stderr never drained");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(process.recent_stderr(), vec!["first", "boom"]);
}

#[tokio::test]
async fn extra_environment_reaches_the_child() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = temp.path().join("env.out");
    let script = format!("printf '%s' \"$PANTRY_USER\" > '{}'", out.display());

    let mut process = ManagedProcess::spawn(
        "main_stage",
        &sh(&script),
        &SpawnOptions::capture().env("PANTRY_USER", "alice"),
    )
    .expect("spawn");
    process.wait_blocking().await.expect("wait");

    assert_eq!(std::fs::read_to_string(out).expect("read"), "alice");
}
