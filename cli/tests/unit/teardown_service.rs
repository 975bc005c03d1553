//! Unit tests for the teardown guard.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt as _;
use infracheck::application::services::teardown::{TeardownGuard, guarded, settle};
use infracheck::domain::{HarnessError, Phase, ProvisioningResult, TeardownPolicy, TeardownStatus};

use crate::helpers::{ACCESS_DENIED, REGISTRY_FAILURE, jobtest_invocation, policy};
use crate::mocks::{MockEngine, Step};

const BUDGET: Duration = Duration::from_secs(1800);

fn provisioned() -> ProvisioningResult {
    ProvisioningResult::succeeded(1, 1, String::new())
}

fn failed_at_apply() -> ProvisioningResult {
    ProvisioningResult::failed(
        HarnessError::TerminalProvisioning {
            phase: Phase::Apply,
            attempts: 1,
            message: ACCESS_DENIED.to_string(),
        },
        1,
        1,
        String::new(),
    )
}

fn failed_at_init() -> ProvisioningResult {
    ProvisioningResult::failed(
        HarnessError::TerminalProvisioning {
            phase: Phase::Init,
            attempts: 1,
            message: "boom".to_string(),
        },
        1,
        0,
        String::new(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_release_destroys_once() {
    let engine = MockEngine::new();
    let guard = TeardownGuard::arm("root", &provisioned(), TeardownPolicy::Always);
    assert!(guard.will_destroy());

    let status = guard
        .release(&engine, &jobtest_invocation(), &policy(3), BUDGET)
        .await;

    assert_eq!(status, TeardownStatus::Destroyed);
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_partial_apply_is_still_destroyed() {
    let engine = MockEngine::new();
    let guard = TeardownGuard::arm("root", &failed_at_apply(), TeardownPolicy::Always);

    let status = guard
        .release(&engine, &jobtest_invocation(), &policy(3), BUDGET)
        .await;

    assert_eq!(status, TeardownStatus::Destroyed);
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nothing_to_destroy_before_apply() {
    let engine = MockEngine::new();
    let guard = TeardownGuard::arm("root", &failed_at_init(), TeardownPolicy::Always);
    assert!(!guard.will_destroy());

    let status = guard
        .release(&engine, &jobtest_invocation(), &policy(3), BUDGET)
        .await;

    assert_eq!(status, TeardownStatus::NotRequired);
    assert!(engine.recorded_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_suppressed_teardown_skips_destroy() {
    let engine = MockEngine::new();
    let guard = TeardownGuard::arm("root", &provisioned(), TeardownPolicy::Suppressed);
    assert!(!guard.will_destroy());

    let status = guard
        .release(&engine, &jobtest_invocation(), &policy(3), BUDGET)
        .await;

    assert_eq!(status, TeardownStatus::Skipped);
    assert_eq!(engine.count("destroy"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_transient_failure_retried() {
    let engine = MockEngine::new().destroy_steps([Step::Fail(REGISTRY_FAILURE), Step::Ok("")]);
    let guard = TeardownGuard::arm("root", &provisioned(), TeardownPolicy::Always);

    let status = guard
        .release(&engine, &jobtest_invocation(), &policy(3), BUDGET)
        .await;

    assert_eq!(status, TeardownStatus::Destroyed);
    assert_eq!(engine.count("destroy"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_failure_reported() {
    let engine = MockEngine::new().destroy_steps([Step::Fail(
        "Error: deleting ECR Repository (jobtest): RepositoryNotEmptyException",
    )]);
    let guard = TeardownGuard::arm("root", &provisioned(), TeardownPolicy::Always);

    let status = guard
        .release(&engine, &jobtest_invocation(), &policy(3), BUDGET)
        .await;

    match status {
        TeardownStatus::Failed { message } => {
            assert!(message.contains("RepositoryNotEmptyException"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_destroy_timeout_reported() {
    let engine = MockEngine::new().destroy_steps([Step::Hang]);
    let guard = TeardownGuard::arm("root", &provisioned(), TeardownPolicy::Always);

    let status = guard
        .release(
            &engine,
            &jobtest_invocation(),
            &policy(3),
            Duration::from_secs(30),
        )
        .await;

    assert_eq!(status, TeardownStatus::TimedOut { after_secs: 30 });
}

#[tokio::test(start_paused = true)]
async fn test_guarded_releases_after_body() {
    let engine = MockEngine::new();
    let guard = TeardownGuard::arm("root", &provisioned(), TeardownPolicy::Always);
    let invocation = jobtest_invocation();

    let (value, status) = guarded(guard, &engine, &invocation, &policy(3), BUDGET, async {
        engine.count("destroy")
    })
    .await;

    assert_eq!(value, 0, "destroy must not run before the body");
    assert_eq!(status, TeardownStatus::Destroyed);
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_guarded_releases_when_body_panics() {
    let engine = MockEngine::new();
    let guard = TeardownGuard::arm("root", &provisioned(), TeardownPolicy::Always);
    let invocation = jobtest_invocation();
    let retry = policy(3);

    let outcome = AssertUnwindSafe(guarded::<()>(
        guard,
        &engine,
        &invocation,
        &retry,
        BUDGET,
        async { panic!("assertion code blew up") },
    ))
    .catch_unwind()
    .await;

    assert!(outcome.is_err(), "panic should propagate");
    assert_eq!(engine.count("destroy"), 1);
}

#[test]
fn test_settle_retires_result_after_destroy() {
    let mut result = provisioned();
    settle(&mut result, &TeardownStatus::Skipped);
    assert!(!result.is_retired());
    settle(&mut result, &TeardownStatus::Destroyed);
    assert!(result.is_retired());
    assert!(result.ensure_outputs_readable("repository_url").is_err());
}
