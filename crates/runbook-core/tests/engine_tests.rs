mod common;

use std::time::Duration;

use common::{fail, ok, MockExecutor, Reply, StaticProbe};
use runbook_core::{
    models::PathKind, Alternative, Confirmation, Criterion, CriterionKind, EnhancedAlternative,
    Plan, PlanRunner, PlanStatus, ProgressEvent, RecoveryConfig, RecoveryStrategy, RunbookError,
    Step, StepStatus,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_memory_check_plan_completes() {
    let executor = MockExecutor::new().on(
        "free -h",
        ok("              total   used\nMem:           15Gi   4Gi\n", 12),
    );
    let plan = Plan::new("Inspect memory").with_step(
        Step::new("mem", "Check memory", "free -h")
            .with_success(Criterion::contains_text("Mem:"))
            .with_failure(Criterion::not_contains_text("error")),
    );

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    assert_eq!(result.message, "All 1 steps completed successfully");
    assert_eq!(result.step_results.len(), 1);

    let step = &result.step_results[0];
    assert_eq!(step.status, StepStatus::Success);
    assert_eq!(step.exit_code, Some(0));
    assert!(step.output.contains("Mem:"));
    assert_eq!(step.success_results.len(), 1);
    assert!(step.success_results[0].passed);
    assert!(step.failure_results[0].passed);
    assert_eq!(step.recovery_attempts_count(), 0);
    assert!(result.ended_at.is_some());
    assert_eq!(executor.calls(), vec!["free -h"]);
}

#[tokio::test]
async fn test_missing_command_recovered_through_login_shell() {
    let executor = MockExecutor::new().on("bash -lc 'foobar'", ok("foobar 1.0", 40));
    let plan = Plan::new("Recover").with_step(Step::new("run", "Run foobar", "foobar"));

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    let step = &result.step_results[0];
    assert_eq!(step.status, StepStatus::Success);
    assert!(step.recovery_attempts_count() >= 1);
    assert!(step.successful_recovery());
    assert_eq!(
        step.successful_strategy,
        Some(RecoveryStrategy::CommandAlternatives)
    );
    assert_eq!(step.command, "bash -lc 'foobar'");
    assert!(step.recovery_attempts[0].success);
    assert_eq!(step.duration_ms, 45);
    assert_eq!(executor.calls(), vec!["foobar", "bash -lc 'foobar'"]);
}

#[tokio::test]
async fn test_recovery_stops_after_max_attempts() {
    let plan = Plan::new("Recover").with_step(
        Step::new("run", "Run foobar", "foobar").with_recovery(RecoveryConfig {
            auto_recovery: true,
            max_attempts: 1,
            timeout_secs: 60,
        }),
    );

    let executor = MockExecutor::new();
    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    let step = &result.step_results[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.recovery_attempts_count(), 1);
    assert!(!step.successful_recovery());
    assert!(step.error.is_some());
    assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn test_alternative_takes_precedence_over_recovery() {
    let executor = MockExecutor::new()
        .on(
            "systemctl restart nginx",
            fail("Failed to restart nginx.service: Unit not found.", 5, 20),
        )
        .on("service nginx restart", ok("Restarting nginx", 30));
    let plan = Plan::new("Restart").with_step(
        Step::new("restart", "Restart nginx", "systemctl restart nginx").with_alternative(
            Alternative::new("Unit .* not found|Unit not found")
                .with_replacement("service nginx restart"),
        ),
    );

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    assert_eq!(result.retries_used, 1);
    let step = &result.step_results[0];
    assert_eq!(step.status, StepStatus::Success);
    assert_eq!(step.retry_count, 1);
    assert_eq!(step.recovery_attempts_count(), 0);
    assert_eq!(
        step.matched_alternative.as_deref(),
        Some("Unit .* not found|Unit not found")
    );
    assert_eq!(step.command, "service nginx restart");
    assert_eq!(
        executor.calls(),
        vec!["systemctl restart nginx", "service nginx restart"]
    );
}

#[tokio::test]
async fn test_alternative_apply_then_rerun() {
    let executor = MockExecutor::new()
        .on("ls /srv/app", fail("ls: cannot access '/srv/app': No such file or directory", 2, 5))
        .on("ls /srv/app", ok("", 5))
        .on("mkdir -p /srv/app", ok("", 5));
    let plan = Plan::new("Prepare").with_step(
        Step::new("list", "List app dir", "ls /srv/app")
            .with_alternative(Alternative::new("No such file").with_apply("mkdir -p /srv/app")),
    );

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    assert_eq!(
        executor.calls(),
        vec!["ls /srv/app", "mkdir -p /srv/app", "ls /srv/app"]
    );
    assert_eq!(result.step_results[0].duration_ms, 15);
}

#[tokio::test]
async fn test_enhanced_alternative_fallback() {
    let executor = MockExecutor::new()
        .on(
            "apt-get install -y jq",
            fail("E: Could not get lock /var/lib/dpkg/lock-frontend", 100, 10),
        )
        .on("snap install jq", ok("jq installed", 10));
    let mut alternative = EnhancedAlternative::new("Could not get lock");
    alternative.retry = false;
    alternative.fallback_commands = vec!["snap install jq".to_string()];
    let plan = Plan::new("Install").with_step(
        Step::new("jq", "Install jq", "apt-get install -y jq")
            .with_enhanced_alternative(alternative)
            .with_recovery(RecoveryConfig::disabled()),
    );

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    let step = &result.step_results[0];
    assert_eq!(step.command, "snap install jq");
    assert_eq!(step.retry_count, 1);
    assert_eq!(step.recovery_attempts_count(), 0);
    assert_eq!(
        executor.calls(),
        vec!["apt-get install -y jq", "snap install jq"]
    );
}

#[tokio::test]
async fn test_retry_budget_is_shared_across_steps() {
    let alternative = || Alternative::new("busy").with_replacement("true");
    let executor = MockExecutor::new()
        .on("first", fail("resource busy", 1, 5))
        .on("second", fail("resource busy", 1, 5))
        .on("true", ok("", 1));
    let plan = Plan::new("Budget")
        .with_max_retries(1)
        .with_step(
            Step::new("a", "First", "first")
                .with_alternative(alternative())
                .with_recovery(RecoveryConfig::disabled()),
        )
        .with_step(
            Step::new("b", "Second", "second")
                .with_alternative(alternative())
                .with_recovery(RecoveryConfig::disabled()),
        );

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    assert_eq!(result.retries_used, 1);
    assert_eq!(result.step_results[0].status, StepStatus::Success);
    assert_eq!(result.step_results[1].status, StepStatus::Failed);
    assert_eq!(result.step_results[1].retry_count, 0);
    assert_eq!(executor.calls(), vec!["first", "true", "second"]);
}

#[tokio::test]
async fn test_plan_time_budget_skips_remaining_steps() {
    let executor = MockExecutor::new()
        .on("step-a", ok("a", 5_000))
        .on("step-b", ok("b", 6_000))
        .on("step-c", ok("c", 1));
    let plan = Plan::new("Budget")
        .with_max_total_time_secs(10)
        .with_step(Step::new("a", "A", "step-a"))
        .with_step(Step::new("b", "B", "step-b"))
        .with_step(Step::new("c", "C", "step-c"));

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    assert!(result.message.starts_with("Stopped before step 'c'"));
    assert_eq!(result.step_results.len(), 3);
    assert_eq!(result.step_results[0].status, StepStatus::Success);
    assert_eq!(result.step_results[1].status, StepStatus::Success);
    assert_eq!(result.step_results[2].status, StepStatus::Skipped);
    assert_eq!(result.total_duration_ms(), 11_000);
    assert!(!executor.calls().contains(&"step-c".to_string()));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let executor = MockExecutor::new().on("echo hi", ok("hi", 1));
    let plan = Plan::new("Cancel")
        .with_step(Step::new("one", "One", "echo hi"))
        .with_step(Step::new("two", "Two", "echo hi"));

    let runner = PlanRunner::builder(executor.clone()).build();
    runner.cancellation_token().cancel();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Cancelled);
    assert!(result
        .step_results
        .iter()
        .all(|r| r.status == StepStatus::Skipped));
    assert!(executor.calls().is_empty());
}

fn checkpoint_plan() -> Plan {
    Plan::new("Deploy")
        .with_step(Step::new("build", "Build", "make build").with_checkpoint("Check the artifact"))
        .with_step(Step::new("ship", "Ship", "make ship"))
}

fn checkpoint_executor() -> MockExecutor {
    MockExecutor::new()
        .on("make build", ok("built", 10))
        .on("make ship", ok("shipped", 10))
}

#[tokio::test]
async fn test_checkpoint_suspends_and_resumes() {
    let executor = checkpoint_executor();
    let plan = checkpoint_plan();
    let runner = PlanRunner::builder(executor.clone()).build();

    let suspended = runner.run(&plan).await.expect("Failed to run plan");
    assert_eq!(suspended.status, PlanStatus::AwaitingConfirmation);
    assert_eq!(suspended.step_results.len(), 1);
    assert_eq!(
        suspended.step_results[0].status,
        StepStatus::AwaitingConfirmation
    );
    let checkpoint = suspended
        .pending_checkpoint
        .clone()
        .expect("checkpoint should be pending");
    assert_eq!(checkpoint.step_id, "build");
    assert_eq!(checkpoint.instructions, "Check the artifact");
    assert_eq!(executor.calls(), vec!["make build"]);

    let resumed = runner
        .resume(&plan, suspended, Confirmation::Approved)
        .await
        .expect("Failed to resume plan");
    assert_eq!(resumed.status, PlanStatus::Completed);
    assert!(resumed.pending_checkpoint.is_none());
    assert_eq!(resumed.step_results.len(), 2);
    assert!(resumed.step_results.iter().all(|r| r.is_success()));
    assert_eq!(executor.calls(), vec!["make build", "make ship"]);
}

#[tokio::test]
async fn test_rejected_checkpoint_fails_plan() {
    let executor = checkpoint_executor();
    let plan = checkpoint_plan();
    let runner = PlanRunner::builder(executor.clone()).build();

    let suspended = runner.run(&plan).await.expect("Failed to run plan");
    let result = runner
        .resume(&plan, suspended, Confirmation::Rejected)
        .await
        .expect("Failed to resume plan");

    assert_eq!(result.status, PlanStatus::Failed);
    assert_eq!(result.step_results[0].status, StepStatus::Failed);
    assert_eq!(
        result.step_results[0].error.as_deref(),
        Some("checkpoint rejected")
    );
    assert_eq!(result.step_results[1].status, StepStatus::Skipped);
    assert_eq!(executor.calls(), vec!["make build"]);
}

#[tokio::test]
async fn test_resume_requires_suspended_run() {
    let executor = MockExecutor::new().on("true", ok("", 1));
    let plan = Plan::new("Plain").with_step(Step::new("t", "True", "true"));
    let runner = PlanRunner::builder(executor).build();

    let finished = runner.run(&plan).await.expect("Failed to run plan");
    let error = runner
        .resume(&plan, finished, Confirmation::Approved)
        .await
        .expect_err("resume of a finished run should fail");
    assert!(matches!(error, RunbookError::InvalidInput { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_recovered_by_reconnecting() {
    let executor = MockExecutor::new()
        .on(
            "uptime",
            Reply::TransportError("connection reset by peer".to_string()),
        )
        .on("uptime", ok("up 3 days", 20));
    let plan = Plan::new("Remote").with_step(
        Step::new("up", "Uptime", "uptime").with_alternative(
            Alternative::new("connection").with_replacement("should-not-run"),
        ),
    );

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    let step = &result.step_results[0];
    assert_eq!(
        step.successful_strategy,
        Some(RecoveryStrategy::RetryConnection)
    );
    assert_eq!(step.retry_count, 0);
    assert!(step.duration_ms >= 3_000);
    assert_eq!(executor.calls(), vec!["uptime", "uptime"]);
}

#[tokio::test]
async fn test_tripped_guard_skips_recovery() {
    let executor = MockExecutor::new().on(
        "deploy",
        ok("done\nwarning: error while reloading config", 10),
    );
    let plan = Plan::new("Guarded").with_step(
        Step::new("deploy", "Deploy", "deploy")
            .with_success(Criterion::contains_text("done"))
            .with_failure(Criterion::not_contains_text("error")),
    );

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    let step = &result.step_results[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert!(step.success_results[0].passed);
    assert!(!step.failure_results[0].passed);
    assert_eq!(step.recovery_attempts_count(), 0);
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn test_global_criteria_failure() {
    let executor = MockExecutor::new().on("echo ready", ok("ready", 1));
    let mut plan = Plan::new("Global").with_step(Step::new("r", "Ready", "echo ready"));
    plan.success_criteria.push(Criterion::contains_text("DONE"));

    let runner = PlanRunner::builder(executor).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    assert!(result.message.starts_with("Global criteria failed"));
    assert_eq!(result.step_results[0].status, StepStatus::Success);
    assert_eq!(result.global_success_results.len(), 1);
    assert!(!result.global_success_results[0].passed);
}

#[tokio::test]
async fn test_filesystem_criteria_use_probe() {
    let executor = MockExecutor::new().on("install-config", ok("", 1));
    let plan = Plan::new("Files").with_step(
        Step::new("cfg", "Install config", "install-config")
            .with_success(Criterion::new(
                "config installed",
                CriterionKind::FileExists("/etc/app.conf".to_string()),
            ))
            .with_failure(Criterion::new(
                "no stale lock",
                CriterionKind::FileNotExists("/run/app.lock".to_string()),
            )),
    );

    let probe = StaticProbe::default().with("/etc/app.conf", PathKind::File);
    let runner = PlanRunner::builder(executor).with_probe(probe).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    assert!(result.step_results[0].success_results[0].passed);
    assert!(result.step_results[0].failure_results[0].passed);
}

#[tokio::test]
async fn test_pre_commands_and_environment_reach_executor() {
    let executor = MockExecutor::new().on("cd /srv && make", ok("ok", 1));
    let mut step = Step::new("make", "Make", "make");
    step.environment
        .insert("MODE".to_string(), "release".to_string());
    let plan = Plan::new("Env")
        .with_env("MODE", "debug")
        .with_env("JOBS", "4")
        .with_pre_command("cd /srv")
        .with_step(step);

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Completed);
    let requests = executor.requests();
    assert_eq!(requests[0].command, "cd /srv && make");
    assert_eq!(requests[0].env.get("MODE").map(String::as_str), Some("release"));
    assert_eq!(requests[0].env.get("JOBS").map(String::as_str), Some("4"));
}

#[tokio::test]
async fn test_invalid_plan_is_rejected_before_running() {
    let executor = MockExecutor::new();
    let plan = Plan::new("Broken")
        .with_step(Step::new("dup", "One", "true"))
        .with_step(Step::new("dup", "Two", "true"));

    let runner = PlanRunner::builder(executor.clone()).build();
    let error = runner.run(&plan).await.expect_err("duplicate ids should fail");

    assert!(matches!(error, RunbookError::InvalidInput { .. }));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_progress_events_are_emitted_in_order() {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let executor = MockExecutor::new().on("echo hi", ok("hi", 3));
    let plan = Plan::new("Events").with_step(Step::new("hi", "Say hi", "echo hi"));

    let runner = PlanRunner::builder(executor).with_events(sender).build();
    runner.run(&plan).await.expect("Failed to run plan");

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }

    assert_eq!(events.len(), 4);
    assert!(matches!(
        &events[0],
        ProgressEvent::PlanStarted { total_steps: 1, .. }
    ));
    assert!(matches!(
        &events[1],
        ProgressEvent::StepStarted { index: 0, step_id, .. } if step_id == "hi"
    ));
    assert_eq!(
        events[2],
        ProgressEvent::StepFinished {
            step_id: "hi".to_string(),
            status: StepStatus::Success,
            duration_ms: 3,
        }
    );
    assert!(matches!(
        &events[3],
        ProgressEvent::PlanFinished {
            status: PlanStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_global_criteria_evaluated_when_step_fails() {
    let executor = MockExecutor::new().on("deploy", fail("boom", 1, 5));
    let mut plan = Plan::new("Early failure")
        .with_step(
            Step::new("deploy", "Deploy", "deploy").with_recovery(RecoveryConfig::disabled()),
        )
        .with_step(Step::new("verify", "Verify", "verify"));
    plan.success_criteria.push(Criterion::contains_text("boom"));
    plan.failure_criteria.push(Criterion::new(
        "deployment succeeded",
        CriterionKind::CommandSucceeded,
    ));

    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    assert!(result.message.starts_with("Step 'deploy' failed"));
    assert_eq!(result.global_success_results.len(), 1);
    assert!(result.global_success_results[0].passed);
    assert_eq!(result.global_failure_results.len(), 1);
    assert!(!result.global_failure_results[0].passed);
    assert_eq!(result.step_results[1].status, StepStatus::Skipped);
    assert_eq!(executor.calls(), vec!["deploy"]);
}

#[tokio::test]
async fn test_recovery_commands_fit_in_recovery_timeout() {
    let plan = Plan::new("Bounded").with_step(
        Step::new("run", "Run foobar", "foobar")
            .with_timeout_secs(30)
            .with_recovery(RecoveryConfig {
                auto_recovery: true,
                max_attempts: 3,
                timeout_secs: 5,
            }),
    );

    let executor = MockExecutor::new();
    let runner = PlanRunner::builder(executor.clone()).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    let requests = executor.requests();
    assert_eq!(requests[0].command, "foobar");
    assert_eq!(requests[0].timeout, Duration::from_secs(30));

    let recovery = &requests[1..];
    assert!(!recovery.is_empty());
    assert_eq!(recovery[0].timeout, Duration::from_secs(5));
    for request in recovery {
        assert!(
            request.timeout <= Duration::from_secs(5),
            "'{}' ran with {:?}",
            request.command,
            request.timeout
        );
    }
    assert_eq!(
        result.step_results[0].recovery_attempts_count(),
        recovery.len()
    );
}

#[tokio::test]
async fn test_cancelled_before_recovery_attempt() {
    let plan = Plan::new("Interrupted")
        .with_step(Step::new("run", "Run foobar", "foobar"))
        .with_step(Step::new("next", "Next", "echo next"));

    let runner_token = CancellationToken::new();
    let executor = MockExecutor::new().cancel_on("foobar", runner_token.clone());
    let runner = PlanRunner::builder(executor.clone())
        .with_cancellation(runner_token)
        .build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Cancelled);
    let step = &result.step_results[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.recovery_attempts_count(), 0);
    assert_eq!(
        step.error.as_deref(),
        Some("cancelled before recovery completed")
    );
    assert_eq!(result.step_results[1].status, StepStatus::Skipped);
    assert_eq!(executor.calls(), vec!["foobar"]);
}

#[tokio::test]
async fn test_checkpoint_past_time_budget_fails_plan() {
    let executor = MockExecutor::new().on("make build", ok("built", 11_000));
    let plan = Plan::new("Slow build")
        .with_max_total_time_secs(10)
        .with_step(Step::new("build", "Build", "make build").with_checkpoint("Check the artifact"));

    let runner = PlanRunner::builder(executor).build();
    let result = runner.run(&plan).await.expect("Failed to run plan");

    assert_eq!(result.status, PlanStatus::Failed);
    assert!(result.message.starts_with("Plan finished past its time budget"));
    assert!(result.pending_checkpoint.is_none());
    assert_eq!(result.step_results[0].status, StepStatus::Failed);
}
