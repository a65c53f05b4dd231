use serde_json::json;

use super::*;
use crate::recovery::RecoveryStrategy;
use crate::RunbookError;

fn sample_plan() -> Plan {
    Plan::new("Provision web host")
        .with_description("Install and check nginx")
        .with_env("DEBIAN_FRONTEND", "noninteractive")
        .with_pre_command("cd /tmp")
        .with_step(
            Step::new("install", "Install nginx", "apt-get install -y nginx")
                .with_timeout_secs(120)
                .with_success(Criterion::command_succeeded())
                .with_failure(Criterion::not_contains_text("E: Unable"))
                .with_alternative(
                    Alternative::new("Could not get lock").with_apply("sleep 5"),
                ),
        )
        .with_step(
            Step::new("check", "Check config", "nginx -t")
                .with_success(Criterion::new(
                    "config present",
                    CriterionKind::FileExists("/etc/nginx/nginx.conf".into()),
                ))
                .with_checkpoint("Open the landing page"),
        )
}

#[test]
fn test_plan_round_trip() {
    let plan = sample_plan();
    let json = serde_json::to_string_pretty(&plan).unwrap();
    let back: Plan = serde_json::from_str(&json).unwrap();
    assert_eq!(plan, back);
}

#[test]
fn test_minimal_plan_uses_defaults() {
    let plan = Plan::from_json_str(
        r#"{
            "title": "Memory",
            "steps": [{"id": "mem", "title": "Check memory", "command": "free -h"}]
        }"#,
    )
    .unwrap();

    assert!(plan.id.starts_with("plan-"));
    assert_eq!(plan.max_total_time_secs, 3600);
    assert_eq!(plan.max_retries, 3);

    let step = &plan.steps[0];
    assert_eq!(step.timeout_secs, 30);
    assert_eq!(step.recovery, RecoveryConfig::default());
    assert!(step.recovery.auto_recovery);
    assert_eq!(step.recovery.max_attempts, 3);
    assert_eq!(step.recovery.timeout_secs, 60);
    assert!(!step.has_criteria());
}

#[test]
fn test_generated_ids_are_unique() {
    assert_ne!(Plan::new("a").id, Plan::new("a").id);
}

#[test]
fn test_criterion_wire_format() {
    let criterion = Criterion::contains_text("Mem:");
    assert_eq!(
        serde_json::to_value(&criterion).unwrap(),
        json!({
            "description": "output contains 'Mem:'",
            "check": {"type": "containsText", "value": "Mem:"}
        })
    );

    let unit: Criterion = serde_json::from_value(json!({
        "description": "ok",
        "check": {"type": "commandSucceeded"}
    }))
    .unwrap();
    assert_eq!(unit.check, CriterionKind::CommandSucceeded);

    let length: Criterion = serde_json::from_value(json!({
        "description": "long",
        "check": {"type": "outputLength", "value": ">100"}
    }))
    .unwrap();
    assert_eq!(
        length.check,
        CriterionKind::OutputLength(LengthRule {
            op: Comparison::Greater,
            threshold: 100
        })
    );
}

#[test]
fn test_length_rule_parsing() {
    let rule: LengthRule = "42".parse().unwrap();
    assert_eq!(rule.op, Comparison::Equal);
    assert!(rule.matches(42));

    let rule: LengthRule = "!= 0".parse().unwrap();
    assert!(rule.matches(1));
    assert!(!rule.matches(0));

    assert!(matches!(
        "about ten".parse::<LengthRule>(),
        Err(RunbookError::InvalidInput { .. })
    ));
}

#[test]
fn test_enhanced_alternative_defaults() {
    let alt: EnhancedAlternative = serde_json::from_value(json!({
        "trigger": "lock",
        "strategies": ["waitAndRetry"]
    }))
    .unwrap();
    assert!(alt.retry);
    assert_eq!(alt.max_attempts, 1);
    assert_eq!(alt.delay_ms, 0);
    assert_eq!(alt.strategies, vec![RecoveryStrategy::WaitAndRetry]);
}

#[test]
fn test_validate_rejects_duplicate_step_ids() {
    let plan = Plan::new("dup")
        .with_step(Step::new("a", "first", "true"))
        .with_step(Step::new("a", "second", "true"));
    let err = plan.validate().unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("duplicate step id 'a'"));
}

#[test]
fn test_validate_rejects_zero_timeout() {
    let plan = Plan::new("t").with_step(Step::new("a", "a", "true").with_timeout_secs(0));
    assert!(matches!(
        plan.validate(),
        Err(RunbookError::InvalidInput { field, .. }) if field == "timeout_secs"
    ));
}

#[test]
fn test_validate_rejects_bad_regexes() {
    let plan = Plan::new("r").with_step(
        Step::new("a", "a", "true").with_alternative(Alternative::new("(unclosed")),
    );
    assert!(matches!(
        plan.validate(),
        Err(RunbookError::InvalidRegex { pattern, .. }) if pattern == "(unclosed"
    ));

    let mut plan = Plan::new("g");
    plan.failure_criteria.push(Criterion::regex_match("[z-a]"));
    assert!(matches!(plan.validate(), Err(RunbookError::InvalidRegex { .. })));
}

#[test]
fn test_validate_rejects_blank_title() {
    assert!(Plan::new("  ").validate().is_err());
}

#[test]
fn test_status_strings() {
    assert_eq!(
        serde_json::to_value(PlanStatus::AwaitingConfirmation).unwrap(),
        json!("AWAITING_CONFIRMATION")
    );
    assert_eq!(serde_json::to_value(StepStatus::Success).unwrap(), json!("SUCCESS"));
    assert_eq!("failed".parse::<StepStatus>(), Ok(StepStatus::Failed));
    assert_eq!("Cancelled".parse::<PlanStatus>(), Ok(PlanStatus::Cancelled));
    assert!("done".parse::<PlanStatus>().is_err());
    assert!(PlanStatus::Failed.is_terminal());
    assert!(!PlanStatus::AwaitingConfirmation.is_terminal());
}

#[test]
fn test_result_accessors() {
    let mut result = PlanExecutionResult::new("p", "Plan");
    let mut step = StepExecutionResult::pending("a", "true", true);
    step.status = StepStatus::Success;
    step.duration_ms = 40;
    step.successful_strategy = Some(RecoveryStrategy::CommandAlternatives);
    result.step_results.push(step);

    let mut failed = StepExecutionResult::pending("b", "false", false);
    failed.status = StepStatus::Failed;
    failed.duration_ms = 2;
    result.step_results.push(failed);

    assert_eq!(result.total_duration_ms(), 42);
    assert_eq!(result.succeeded_steps(), 1);
    assert_eq!(result.failed_step().map(|s| s.step_id.as_str()), Some("b"));
    assert!(result.step_results[0].successful_recovery());

    let summary = RunSummary::from_result(7, &result);
    assert_eq!(summary.total_steps, 2);
    assert_eq!(summary.unsuccessful_steps(), 1);
}
