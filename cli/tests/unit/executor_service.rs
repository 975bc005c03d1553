//! Unit tests for the retry-wrapped executor and the output extractor.
//!
//! Time is paused so backoff sleeps and deadlines complete instantly.

use std::time::Duration;

use infracheck::application::ports::INTERRUPT_GRACE;
use infracheck::application::services::executor::provision;
use infracheck::application::services::extractor::extract;
use infracheck::domain::{HarnessError, Phase, ProvisioningResult, ResourceState, RetryPolicy};
use tokio_util::sync::CancellationToken;

use crate::helpers::{
    ACCESS_DENIED, REGISTRY_FAILURE, REPOSITORY_URL, jobtest_invocation, policy,
};
use crate::mocks::{MockEngine, Step};

const BUDGET: Duration = Duration::from_secs(1800);

// ── provision ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_transient_failures_retried_until_success() {
    let engine = MockEngine::new().apply_steps([
        Step::Fail(REGISTRY_FAILURE),
        Step::Fail(REGISTRY_FAILURE),
        Step::Ok("Apply complete! Resources: 4 added, 0 changed, 0 destroyed."),
    ]);

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &CancellationToken::new()).await;

    assert!(result.success(), "got {:?}", result.error);
    assert_eq!(result.apply_attempts, 3);
    assert_eq!(engine.count("apply"), 3);
    assert!(result.log.contains("apply attempt 3"));
    assert!(result.log.contains("Apply complete!"));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_between_attempts() {
    let engine = MockEngine::new().apply_steps([Step::Fail(REGISTRY_FAILURE), Step::Ok("")]);
    let start = tokio::time::Instant::now();

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &CancellationToken::new()).await;

    assert!(result.success());
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_non_matching_failure_is_not_retried() {
    let engine = MockEngine::new().apply_steps([Step::Fail(ACCESS_DENIED), Step::Ok("")]);

    let result = provision(&engine, &jobtest_invocation(), &policy(4), BUDGET, &CancellationToken::new()).await;

    assert_eq!(result.apply_attempts, 1);
    assert_eq!(engine.count("apply"), 1);
    assert!(result.reached_apply);
    match result.error {
        Some(HarnessError::TerminalProvisioning {
            phase: Phase::Apply,
            attempts: 1,
            ref message,
        }) => assert!(message.contains("AccessDeniedException")),
        other => panic!("expected terminal apply failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_stops_at_max_attempts() {
    let engine = MockEngine::new().apply_steps(std::iter::repeat_n(
        Step::Fail(REGISTRY_FAILURE),
        10,
    ));

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &CancellationToken::new()).await;

    assert_eq!(engine.count("apply"), 3);
    match result.error {
        Some(HarnessError::TransientProvisioning {
            attempts: 3,
            ref signature,
            ..
        }) => assert!(signature.contains("provider plugin")),
        other => panic!("expected exhausted transient failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_policy_without_signatures_never_retries() {
    let engine = MockEngine::new().apply_steps([Step::Fail(REGISTRY_FAILURE), Step::Ok("")]);

    let result = provision(&engine, &jobtest_invocation(), &RetryPolicy::none(), BUDGET, &CancellationToken::new()).await;

    assert_eq!(result.apply_attempts, 1);
    assert!(matches!(
        result.error,
        Some(HarnessError::TerminalProvisioning { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_apply_times_out_with_unknown_state() {
    let engine = MockEngine::new().apply_steps([Step::Hang]);
    let budget = Duration::from_secs(90);

    let result = provision(&engine, &jobtest_invocation(), &policy(3), budget, &CancellationToken::new()).await;

    assert!(result.apply_timed_out());
    assert!(result.reached_apply);
    assert_eq!(result.resource_state(), ResourceState::Unknown);
    match result.error {
        Some(HarnessError::Timeout {
            phase: Phase::Apply,
            after,
            resource_state: ResourceState::Unknown,
        }) => assert_eq!(after, budget),
        other => panic!("expected apply timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_runner_timeout_maps_to_timeout() {
    let engine = MockEngine::new().apply_steps([Step::RunnerTimeout]);

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &CancellationToken::new()).await;

    assert_eq!(engine.count("apply"), 1);
    assert!(result.apply_timed_out());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_includes_backoff_waits() {
    // Attempt 1 at t=0, attempt 2 at t=5; a further 5s wait would pass t=7.
    let engine = MockEngine::new().apply_steps(std::iter::repeat_n(
        Step::Fail(REGISTRY_FAILURE),
        10,
    ));

    let result = provision(
        &engine,
        &jobtest_invocation(),
        &policy(10),
        Duration::from_secs(7),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(engine.count("apply"), 2);
    assert!(result.apply_timed_out());
}

#[tokio::test(start_paused = true)]
async fn test_init_shares_the_apply_budget() {
    let engine = MockEngine::new()
        .init_steps([Step::Slow(Duration::from_secs(50))])
        .apply_steps([Step::Hang]);

    let start = tokio::time::Instant::now();
    let result = provision(
        &engine,
        &jobtest_invocation(),
        &policy(3),
        Duration::from_secs(60),
        &CancellationToken::new(),
    )
    .await;

    assert!(result.apply_timed_out());
    // Apply only had the 10s init left over, plus the grace a runner gets to
    // stop the engine.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(60), "elapsed {elapsed:?}");
    assert!(
        elapsed < Duration::from_secs(70) + INTERRUPT_GRACE,
        "elapsed {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_init_failure_never_reaches_apply() {
    let engine = MockEngine::new().init_steps([Step::Fail(
        "Error: Unsupported Terraform Core version",
    )]);

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &CancellationToken::new()).await;

    assert_eq!(engine.recorded_calls(), vec!["init"]);
    assert!(!result.reached_apply);
    assert_eq!(result.apply_attempts, 0);
    assert_eq!(result.resource_state(), ResourceState::NotCreated);
    assert!(matches!(
        result.error,
        Some(HarnessError::TerminalProvisioning {
            phase: Phase::Init,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transient_init_failure_retried() {
    let engine = MockEngine::new().init_steps([Step::Fail(REGISTRY_FAILURE), Step::Ok("")]);

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &CancellationToken::new()).await;

    assert!(result.success());
    assert_eq!(result.init_attempts, 2);
    assert_eq!(result.apply_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_module_is_configuration_error() {
    let engine = MockEngine::new().missing_module();

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &CancellationToken::new()).await;

    assert!(engine.recorded_calls().is_empty());
    assert!(matches!(result.error, Some(HarnessError::Configuration(_))));
    assert_eq!(result.apply_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_runs_nothing() {
    let engine = MockEngine::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &cancel).await;

    assert!(engine.recorded_calls().is_empty());
    assert!(!result.reached_apply);
    assert_eq!(result.resource_state(), ResourceState::NotCreated);
    assert!(matches!(
        result.error,
        Some(HarnessError::Interrupted {
            phase: Phase::Init,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_hanging_apply_leaves_state_unknown() {
    let engine = MockEngine::new().apply_steps([Step::Hang]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(100)).await;
        trigger.cancel();
    });
    let start = tokio::time::Instant::now();

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &cancel).await;

    assert!(result.reached_apply);
    assert_eq!(result.resource_state(), ResourceState::Unknown);
    assert!(matches!(
        result.error,
        Some(HarnessError::Interrupted {
            phase: Phase::Apply,
            resource_state: ResourceState::Unknown,
        })
    ));
    // The engine got the grace period to stop on its own.
    let elapsed = start.elapsed();
    let expected = Duration::from_secs(100) + INTERRUPT_GRACE;
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_secs(1),
        "elapsed {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_stops_retrying() {
    let engine = MockEngine::new().apply_steps([Step::Fail(REGISTRY_FAILURE), Step::Ok("")]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let result = provision(&engine, &jobtest_invocation(), &policy(3), BUDGET, &cancel).await;

    assert_eq!(engine.count("apply"), 1);
    assert_eq!(result.resource_state(), ResourceState::Retained);
    assert!(matches!(
        result.error,
        Some(HarnessError::Interrupted {
            phase: Phase::Apply,
            ..
        })
    ));
}

// ── extract ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_extract_reads_declared_output() {
    let engine = MockEngine::new().output("repository_url", [Step::Ok(REPOSITORY_URL)]);
    let result = ProvisioningResult::succeeded(1, 1, String::new());

    let value = extract(
        &engine,
        &jobtest_invocation(),
        &result,
        "repository_url",
        &policy(3),
        Duration::from_secs(60),
        &CancellationToken::new(),
    )
    .await
    .expect("output should be readable");

    assert_eq!(
        value.as_match_text(),
        "123456789012.dkr.ecr.us-east-1.amazonaws.com/jobtest"
    );
}

#[tokio::test(start_paused = true)]
async fn test_extract_after_failed_provisioning_does_not_call_engine() {
    let engine = MockEngine::new();
    let result = ProvisioningResult::failed(
        HarnessError::Configuration("x".to_string()),
        0,
        0,
        String::new(),
    );

    let err = extract(
        &engine,
        &jobtest_invocation(),
        &result,
        "repository_url",
        &policy(3),
        Duration::from_secs(60),
        &CancellationToken::new(),
    )
    .await
    .expect_err("failed result has no outputs");

    assert!(matches!(err, HarnessError::OutputNotFound { .. }));
    assert!(engine.recorded_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_extract_undeclared_output_is_not_found() {
    let engine = MockEngine::new();
    let result = ProvisioningResult::succeeded(1, 1, String::new());

    let err = extract(
        &engine,
        &jobtest_invocation(),
        &result,
        "nope",
        &policy(3),
        Duration::from_secs(60),
        &CancellationToken::new(),
    )
    .await
    .expect_err("undeclared output");

    match err {
        HarnessError::OutputNotFound { name, .. } => assert_eq!(name, "nope"),
        other => panic!("expected OutputNotFound, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_extract_retries_transient_output_failure() {
    let engine = MockEngine::new().output(
        "repository_url",
        [
            Step::Fail("Error: Failed to load state: read: connection reset by peer"),
            Step::Ok(REPOSITORY_URL),
        ],
    );
    let result = ProvisioningResult::succeeded(1, 1, String::new());

    let value = extract(
        &engine,
        &jobtest_invocation(),
        &result,
        "repository_url",
        &policy(3),
        Duration::from_secs(60),
        &CancellationToken::new(),
    )
    .await;

    assert!(value.is_ok(), "got {value:?}");
    assert_eq!(engine.count("output:repository_url"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_extract_rejects_non_json_output() {
    let engine = MockEngine::new().output("repository_url", [Step::Ok("not json")]);
    let result = ProvisioningResult::succeeded(1, 1, String::new());

    let err = extract(
        &engine,
        &jobtest_invocation(),
        &result,
        "repository_url",
        &policy(3),
        Duration::from_secs(60),
        &CancellationToken::new(),
    )
    .await
    .expect_err("malformed output");

    assert!(matches!(err, HarnessError::OutputNotFound { .. }));
}
