//! Application service — run one case, or a whole suite of cases.
//!
//! A case goes provision → validate → teardown. Teardown is driven by a
//! [`TeardownGuard`] so it happens exactly once whatever validation does.
//! Cancelling the run stops provisioning and validation between engine
//! steps; cases that reached apply are still torn down.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

use crate::application::ports::{ModuleWorkspace, ProgressReporter, ProvisioningEngine};
use crate::application::services::executor::provision;
use crate::application::services::teardown::{TeardownGuard, guarded, settle};
use crate::application::services::validation::{Validation, validate};
use crate::domain::{
    AssertionReport, CaseOutcome, CaseReport, HarnessError, InvocationState, Lifecycle, Phase,
    ResolvedCase, ResourceState, TeardownStatus,
};

/// Run every case in `cases`.
///
/// Cases run concurrently when `parallel` is set, unless two of them would
/// share an engine working directory; those suites fall back to sequential
/// execution. Reports come back in input order, including for cases that
/// `cancel` stopped or kept from starting.
pub async fn run_suite(
    engine: &impl ProvisioningEngine,
    workspace: &impl ModuleWorkspace,
    reporter: &impl ProgressReporter,
    cases: &[ResolvedCase],
    parallel: bool,
    cancel: &CancellationToken,
) -> Vec<CaseReport> {
    if parallel && cases.len() > 1 {
        if let Some(dir) = shared_working_dir(cases) {
            tracing::warn!(
                module = %dir.display(),
                "several cases share a working directory without copy_to_temp; running sequentially"
            );
        } else {
            return join_all(
                cases
                    .iter()
                    .map(|c| run_case(engine, workspace, reporter, c, cancel)),
            )
            .await;
        }
    }

    let mut reports = Vec::with_capacity(cases.len());
    for case in cases {
        reports.push(run_case(engine, workspace, reporter, case, cancel).await);
    }
    reports
}

/// First module directory used in place by more than one case.
fn shared_working_dir(cases: &[ResolvedCase]) -> Option<&Path> {
    let mut seen = HashSet::new();
    cases
        .iter()
        .filter(|c| !c.copy_to_temp)
        .map(|c| c.invocation.module_dir())
        .find(|dir| !seen.insert(*dir))
}

/// Provision, validate and tear down one case.
///
/// Never fails: every error is captured in the returned report.
pub async fn run_case(
    engine: &impl ProvisioningEngine,
    workspace: &impl ModuleWorkspace,
    reporter: &impl ProgressReporter,
    case: &ResolvedCase,
    cancel: &CancellationToken,
) -> CaseReport {
    let span = tracing::info_span!("case", name = %case.name);
    run_case_inner(engine, workspace, reporter, case, cancel)
        .instrument(span)
        .await
}

async fn run_case_inner(
    engine: &impl ProvisioningEngine,
    workspace: &impl ModuleWorkspace,
    reporter: &impl ProgressReporter,
    case: &ResolvedCase,
    cancel: &CancellationToken,
) -> CaseReport {
    let started_at = Utc::now();
    let mut lifecycle = Lifecycle::default();

    if cancel.is_cancelled() {
        let error = HarnessError::Interrupted {
            phase: Phase::Init,
            resource_state: ResourceState::NotCreated,
        };
        reporter.warn(&format!("{}: not started, run was interrupted", case.name));
        return not_started(case, &error, started_at);
    }

    // Scratch copy lives until the end of this function.
    let (invocation, _scratch) = if case.copy_to_temp {
        match workspace.isolate(case.invocation.module_dir()) {
            Ok((dir, guard)) => {
                tracing::debug!(dir = %dir.display(), "module copied to scratch directory");
                (case.invocation.relocated(dir), Some(guard))
            }
            Err(e) => {
                let error = HarnessError::Configuration(format!("cannot isolate module: {e:#}"));
                reporter.warn(&format!("{}: {error}", case.name));
                return not_started(case, &error, started_at);
            }
        }
    } else {
        (case.invocation.clone(), None)
    };

    let module = case.invocation.module_dir().display().to_string();
    reporter.step(&format!("{}: provisioning {module}", case.name));
    transition(&mut lifecycle, InvocationState::Provisioning);
    let mut result = provision(engine, &invocation, &case.policy, case.timeouts.apply, cancel).await;
    if result.success() {
        transition(&mut lifecycle, InvocationState::Provisioned);
        reporter.success(&format!(
            "{}: provisioned after {} apply attempt(s)",
            case.name, result.apply_attempts
        ));
    } else {
        transition(
            &mut lifecycle,
            InvocationState::Failed {
                reached_apply: result.reached_apply,
            },
        );
    }

    let guard = TeardownGuard::arm(&case.name, &result, case.teardown);
    if guard.will_destroy() {
        tracing::debug!("teardown armed");
    }
    let (validation, teardown) = guarded(
        guard,
        engine,
        &invocation,
        &case.policy,
        case.timeouts.destroy,
        async {
            if !result.success() {
                return Validation::default();
            }
            if cancel.is_cancelled() {
                return Validation {
                    report: AssertionReport::default(),
                    error: Some(HarnessError::Interrupted {
                        phase: Phase::Output,
                        resource_state: ResourceState::Retained,
                    }),
                };
            }
            reporter.step(&format!("{}: checking outputs", case.name));
            transition(&mut lifecycle, InvocationState::Validating);
            let validation = validate(
                engine,
                &invocation,
                &result,
                &case.expectations,
                &case.policy,
                &case.timeouts,
                cancel,
            )
            .await;
            transition(
                &mut lifecycle,
                InvocationState::Validated {
                    passed: validation.report.passed(),
                },
            );
            validation
        },
    )
    .await;

    settle(&mut result, &teardown);
    if matches!(
        teardown,
        TeardownStatus::Destroyed | TeardownStatus::Failed { .. } | TeardownStatus::TimedOut { .. }
    ) {
        transition(&mut lifecycle, InvocationState::TornDown);
    }

    let Validation {
        report: assertions,
        error: output_error,
    } = validation;
    let error = result.error.clone().or(output_error);
    let outcome = classify(error.as_ref(), &assertions);
    let resource_state = teardown.resulting_state(result.resource_state());
    let error = error.map(|e| e.with_resource_state(resource_state));
    let (error_text, error_code) = match (&error, outcome) {
        (Some(e), _) => (Some(e.to_string()), Some(e.code().to_string())),
        (None, CaseOutcome::AssertionFailed) => match assertions.clone().into_result() {
            Err(e) => (Some(e.to_string()), Some(e.code().to_string())),
            Ok(()) => (None, None),
        },
        (None, _) => (None, None),
    };

    match outcome {
        CaseOutcome::Passed => reporter.success(&format!("{}: passed", case.name)),
        _ => reporter.warn(&format!(
            "{}: {}",
            case.name,
            error_text.as_deref().unwrap_or("failed")
        )),
    }
    if resource_state == ResourceState::Unknown {
        reporter.warn(&format!(
            "{}: resource state unknown, inspect {module} for leaked resources",
            case.name
        ));
    }

    CaseReport {
        name: case.name.clone(),
        module,
        outcome,
        apply_attempts: result.apply_attempts,
        error: error_text,
        error_code,
        assertions: assertions.outcomes,
        teardown,
        resource_state,
        state: lifecycle.state(),
        started_at,
        finished_at: Utc::now(),
    }
}

/// Report for a case that ended before provisioning began.
fn not_started(case: &ResolvedCase, error: &HarnessError, started_at: DateTime<Utc>) -> CaseReport {
    CaseReport {
        name: case.name.clone(),
        module: case.invocation.module_dir().display().to_string(),
        outcome: classify(Some(error), &AssertionReport::default()),
        apply_attempts: 0,
        error_code: Some(error.code().to_string()),
        error: Some(error.to_string()),
        assertions: Vec::new(),
        teardown: TeardownStatus::NotRequired,
        resource_state: ResourceState::NotCreated,
        state: InvocationState::Created,
        started_at,
        finished_at: Utc::now(),
    }
}

/// Only a timeout that leaves resources unaccounted for is reported as
/// `TimedOut`; init and output timeouts are ordinary provisioning failures.
fn classify(error: Option<&HarnessError>, assertions: &AssertionReport) -> CaseOutcome {
    match error {
        Some(HarnessError::Interrupted { .. }) => CaseOutcome::Interrupted,
        Some(e) if e.is_timeout() && e.resource_state() == Some(ResourceState::Unknown) => {
            CaseOutcome::TimedOut
        }
        Some(_) => CaseOutcome::ProvisioningFailed,
        None if assertions.passed() => CaseOutcome::Passed,
        None => CaseOutcome::AssertionFailed,
    }
}

fn transition(lifecycle: &mut Lifecycle, next: InvocationState) {
    if let Err(e) = lifecycle.advance(next) {
        tracing::error!(error = %e, "lifecycle out of sequence");
    }
}
