//! Teardown as a scoped resource.
//!
//! A [`TeardownGuard`] is armed as soon as an apply has been attempted. It
//! must be released exactly once through [`TeardownGuard::release`], which
//! consumes it; [`guarded`] runs a body and then releases the guard on every
//! exit path, including a panic in the body. A guard dropped while still
//! armed (for example when a second interrupt abandons the run) logs the
//! possible leak.
//!
//! Destroy is not tied to the run's cancellation token: a cancelled run
//! still tears down what it created.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt as _;
use tokio_util::sync::CancellationToken;

use crate::application::ports::ProvisioningEngine;
use crate::application::services::executor::retry_step;
use crate::domain::{
    HarnessError, ModuleInvocation, Phase, ProvisioningResult, RetryPolicy, TeardownPolicy,
    TeardownStatus,
};

/// Pending destroy of an invocation's resources.
#[must_use = "a teardown guard must be released or resources may leak"]
pub struct TeardownGuard {
    case: String,
    needed: bool,
    policy: TeardownPolicy,
    armed: bool,
}

impl TeardownGuard {
    /// Arm a guard for `result`.
    ///
    /// Nothing needs destroying when the apply step was never reached.
    pub fn arm(case: &str, result: &ProvisioningResult, policy: TeardownPolicy) -> Self {
        let needed = result.reached_apply;
        Self {
            case: case.to_string(),
            needed,
            policy,
            armed: needed && policy == TeardownPolicy::Always,
        }
    }

    /// Whether release will call destroy.
    #[must_use]
    pub fn will_destroy(&self) -> bool {
        self.armed
    }

    /// Run (or skip) destroy and disarm.
    pub async fn release(
        mut self,
        engine: &impl ProvisioningEngine,
        invocation: &ModuleInvocation,
        retry: &RetryPolicy,
        budget: Duration,
    ) -> TeardownStatus {
        if !self.needed {
            return TeardownStatus::NotRequired;
        }
        if self.policy == TeardownPolicy::Suppressed {
            tracing::warn!(
                case = %self.case,
                module = %invocation.module_dir().display(),
                "teardown suppressed; resources left in place"
            );
            return TeardownStatus::Skipped;
        }

        tracing::info!(case = %self.case, "destroying provisioned resources");
        let mut log = String::new();
        let step = retry_step(
            Phase::Destroy,
            retry,
            budget,
            &CancellationToken::new(),
            &mut log,
            move |remaining| engine.destroy(invocation, remaining),
        )
        .await;
        self.armed = false;

        match step.outcome {
            Ok(_) => TeardownStatus::Destroyed,
            Err(HarnessError::Timeout { after, .. }) => {
                tracing::error!(case = %self.case, "destroy timed out; resources may have leaked");
                TeardownStatus::TimedOut {
                    after_secs: after.as_secs(),
                }
            }
            Err(e) => {
                tracing::error!(case = %self.case, error = %e, "destroy failed; resources may have leaked");
                TeardownStatus::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!(
                case = %self.case,
                "teardown never ran; provisioned resources may have leaked, destroy them manually"
            );
        }
    }
}

/// Run `body`, then release `guard`, whatever `body` does.
///
/// If `body` panics, the guard is still released before the panic resumes.
pub async fn guarded<T>(
    guard: TeardownGuard,
    engine: &impl ProvisioningEngine,
    invocation: &ModuleInvocation,
    retry: &RetryPolicy,
    budget: Duration,
    body: impl Future<Output = T>,
) -> (T, TeardownStatus) {
    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    let status = guard.release(engine, invocation, retry, budget).await;
    match outcome {
        Ok(value) => (value, status),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Retire `result` if teardown touched its resources.
pub fn settle(result: &mut ProvisioningResult, status: &TeardownStatus) {
    if matches!(
        status,
        TeardownStatus::Destroyed | TeardownStatus::Failed { .. } | TeardownStatus::TimedOut { .. }
    ) {
        result.retire();
    }
}
