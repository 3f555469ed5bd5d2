//! Integration tests for subprocess execution: timeouts and cancellation

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::TestProject;
use hdlbuild::core::classify::{Classifier, Severity};
use hdlbuild::core::tool::{CommandRunner, Invocation, ToolCommand, ToolStatus};
use hdlbuild::infra::process::ProcessRunner;
use tokio_util::sync::CancellationToken;

fn sh(project: &TestProject, script: &str) -> ToolCommand {
    ToolCommand::new("sh", project.path()).args(["-c", script])
}

/// Test: a process exceeding its timeout is killed and reported as timed out
#[tokio::test]
async fn test_timeout_kills_process() {
    let project = TestProject::new();
    let mut invocation = Invocation::single(sh(&project, "echo started; sleep 10"));
    invocation.timeout = Some(Duration::from_millis(300));

    let start = Instant::now();
    let result = ProcessRunner::new()
        .run(&invocation, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, ToolStatus::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(result.stdout.contains("started"));

    let classification = Classifier::standard().unwrap().classify(&result);
    assert!(!classification.verdict.is_success());
    assert_eq!(classification.at_least(Severity::Fatal).count(), 1);
}

/// Test: the timeout spans every step of an invocation
#[tokio::test]
async fn test_timeout_covers_all_steps() {
    let project = TestProject::new();
    let invocation = Invocation {
        steps: vec![sh(&project, "sleep 0.2"), sh(&project, "sleep 10")],
        timeout: Some(Duration::from_millis(600)),
        ..Invocation::default()
    };

    let result = ProcessRunner::new()
        .run(&invocation, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, ToolStatus::TimedOut);
}

/// Test: cancelling while a process runs terminates it
#[tokio::test]
async fn test_cancel_during_run() {
    let project = TestProject::new();
    let invocation = Invocation::single(sh(&project, "sleep 10"));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = ProcessRunner::new().run(&invocation, &cancel).await.unwrap();

    assert_eq!(result.status, ToolStatus::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(5));
}

/// Test: output that is not UTF-8 is still captured in full and classified
#[tokio::test]
async fn test_non_utf8_output_captured() {
    let project = TestProject::new();
    let invocation = Invocation::single(sh(
        &project,
        "printf 'Temp: 25\\260C\\n'; echo '** Fatal: assertion failed'; exit 0",
    ));

    let result = ProcessRunner::new()
        .run(&invocation, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, ToolStatus::Exited(0));
    assert!(result.stdout.contains("Temp: 25"), "{}", result.stdout);
    assert!(result.stdout.contains('\u{FFFD}'));
    assert!(result.stdout.contains("** Fatal: assertion failed"));

    let classification = Classifier::standard().unwrap().classify(&result);
    assert!(!classification.verdict.is_success());
}

/// Test: the working directory is created before the process starts
#[tokio::test]
async fn test_missing_work_dir_created() {
    let project = TestProject::new();
    let work = project.path().join("build/sim");
    let invocation = Invocation::single(ToolCommand::new("sh", &work).args(["-c", "pwd"]));

    let result = ProcessRunner::new()
        .run(&invocation, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, ToolStatus::Exited(0));
    assert!(result.stdout.trim_end().ends_with("build/sim"));
}
