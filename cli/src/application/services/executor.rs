//! Retry-wrapped executor: init + apply under a `RetryPolicy` and a deadline.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::fmt::Write as _;
use std::future::Future;
use std::process::Output;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{INTERRUPT_GRACE, ProvisioningEngine};
use crate::domain::{
    Classification, CommandTimedOut, HarnessError, ModuleInvocation, Phase, ProvisioningResult,
    ResourceState, RetryPolicy,
};

/// Extra time past a runner's interrupt grace before the executor gives up
/// on a step that ignored its deadline.
const CUTOFF_SLACK: Duration = Duration::from_secs(5);

/// Result of one retried engine step.
#[derive(Debug)]
pub struct StepReport {
    pub attempts: u32,
    pub outcome: Result<Output, HarnessError>,
}

/// Run `step` until it succeeds, fails terminally, exhausts the policy, the
/// `budget` elapses, or `cancel` fires.
///
/// `step` receives the time remaining before the deadline and should pass it
/// on as its own process timeout. The executor also enforces the deadline
/// itself, allowing [`INTERRUPT_GRACE`] for the step to stop its process, so
/// a step that ignores it is still cut off. On cancellation an in-flight
/// step gets the same grace to wind down. Every attempt's output is appended
/// to `log`.
pub async fn retry_step<F, Fut>(
    phase: Phase,
    policy: &RetryPolicy,
    budget: Duration,
    cancel: &CancellationToken,
    log: &mut String,
    mut step: F,
) -> StepReport
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = anyhow::Result<Output>>,
{
    let deadline = Instant::now() + budget;
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return StepReport {
                attempts,
                outcome: Err(interrupted(phase, false)),
            };
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return StepReport {
                attempts,
                outcome: Err(timeout(phase, budget)),
            };
        }

        attempts += 1;
        tracing::debug!(%phase, attempt = attempts, "running engine step");
        let _ = writeln!(log, "── {phase} attempt {attempts} ──");

        let cutoff = remaining + INTERRUPT_GRACE + CUTOFF_SLACK;
        let attempt = tokio::time::timeout(cutoff, step(remaining));
        tokio::pin!(attempt);
        let finished = tokio::select! {
            finished = &mut attempt => finished,
            () = cancel.cancelled() => {
                tracing::warn!(%phase, attempt = attempts, "cancelled, waiting for the engine to stop");
                let outcome = match tokio::time::timeout(INTERRUPT_GRACE, &mut attempt).await {
                    Ok(Ok(Ok(output))) => {
                        log.push_str(&combined_text(&output));
                        if output.status.success() {
                            Ok(output)
                        } else {
                            Err(interrupted(phase, false))
                        }
                    }
                    _ => Err(interrupted(phase, true)),
                };
                return StepReport { attempts, outcome };
            }
        };

        let text = match finished {
            Err(_elapsed) => {
                return StepReport {
                    attempts,
                    outcome: Err(timeout(phase, budget)),
                };
            }
            Ok(Err(e)) if e.downcast_ref::<CommandTimedOut>().is_some() => {
                return StepReport {
                    attempts,
                    outcome: Err(timeout(phase, budget)),
                };
            }
            Ok(Err(e)) => format!("{e:#}\n"),
            Ok(Ok(output)) => {
                let text = combined_text(&output);
                for line in text.lines() {
                    tracing::debug!(%phase, "{line}");
                }
                if output.status.success() {
                    log.push_str(&text);
                    return StepReport {
                        attempts,
                        outcome: Ok(output),
                    };
                }
                text
            }
        };
        log.push_str(&text);
        // The engine shares the terminal's interrupt and may exit before the
        // token is seen above.
        if cancel.is_cancelled() {
            return StepReport {
                attempts,
                outcome: Err(interrupted(phase, false)),
            };
        }

        match policy.classify(&text) {
            Classification::Transient(signature) if attempts < policy.max_attempts() => {
                let delay = policy.backoff().delay_after(attempts);
                if Instant::now() + delay >= deadline {
                    return StepReport {
                        attempts,
                        outcome: Err(timeout(phase, budget)),
                    };
                }
                tracing::warn!(
                    %phase,
                    attempt = attempts,
                    max_attempts = policy.max_attempts(),
                    signature = %signature,
                    delay_secs = delay.as_secs(),
                    "transient engine failure, retrying"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => {
                        return StepReport {
                            attempts,
                            outcome: Err(interrupted(phase, false)),
                        };
                    }
                }
            }
            Classification::Transient(signature) => {
                return StepReport {
                    attempts,
                    outcome: Err(HarnessError::TransientProvisioning {
                        phase,
                        signature,
                        attempts,
                        message: tail(&text),
                    }),
                };
            }
            Classification::Terminal => {
                return StepReport {
                    attempts,
                    outcome: Err(HarnessError::TerminalProvisioning {
                        phase,
                        attempts,
                        message: tail(&text),
                    }),
                };
            }
        }
    }
}

/// Initialize and apply `invocation`.
///
/// Init and apply are retried independently under `policy`; both share the
/// `budget` deadline. Never returns early without a result: every failure is
/// captured in the returned `ProvisioningResult`.
pub async fn provision(
    engine: &impl ProvisioningEngine,
    invocation: &ModuleInvocation,
    policy: &RetryPolicy,
    budget: Duration,
    cancel: &CancellationToken,
) -> ProvisioningResult {
    let mut log = String::new();

    if !engine.module_exists(invocation) {
        return ProvisioningResult::failed(
            HarnessError::Configuration(format!(
                "no module definition found at {}",
                invocation.module_dir().display()
            )),
            0,
            0,
            log,
        );
    }

    let started = Instant::now();
    let init = retry_step(Phase::Init, policy, budget, cancel, &mut log, move |remaining| {
        engine.init(invocation, remaining)
    })
    .await;
    if let Err(e) = init.outcome {
        return ProvisioningResult::failed(e, init.attempts, 0, log);
    }

    let remaining = budget.saturating_sub(started.elapsed());
    let apply = retry_step(Phase::Apply, policy, remaining, cancel, &mut log, move |remaining| {
        engine.apply(invocation, remaining)
    })
    .await;
    match apply.outcome {
        Ok(_) => {
            tracing::info!(attempts = apply.attempts, "apply succeeded");
            ProvisioningResult::succeeded(init.attempts, apply.attempts, log)
        }
        Err(e) => {
            let e = match e {
                // Init used up the budget, or the run was cancelled; apply
                // never started.
                HarnessError::Timeout { phase, .. } if apply.attempts == 0 => {
                    HarnessError::Timeout {
                        phase,
                        after: budget,
                        resource_state: ResourceState::NotCreated,
                    }
                }
                e @ HarnessError::Interrupted { .. } if apply.attempts == 0 => {
                    e.with_resource_state(ResourceState::NotCreated)
                }
                HarnessError::Timeout { phase, .. } => HarnessError::Timeout {
                    phase,
                    after: budget,
                    resource_state: ResourceState::Unknown,
                },
                other => other,
            };
            ProvisioningResult::failed(e, init.attempts, apply.attempts, log)
        }
    }
}

fn timeout(phase: Phase, after: Duration) -> HarnessError {
    let resource_state = match phase {
        Phase::Init => ResourceState::NotCreated,
        Phase::Output => ResourceState::Retained,
        Phase::Apply | Phase::Destroy => ResourceState::Unknown,
    };
    HarnessError::Timeout {
        phase,
        after,
        resource_state,
    }
}

/// `in_flight` is set when the engine process had to be abandoned mid-step
/// rather than stopping on its own.
fn interrupted(phase: Phase, in_flight: bool) -> HarnessError {
    let resource_state = match phase {
        Phase::Init => ResourceState::NotCreated,
        Phase::Apply | Phase::Destroy if in_flight => ResourceState::Unknown,
        Phase::Output | Phase::Apply | Phase::Destroy => ResourceState::Retained,
    };
    HarnessError::Interrupted {
        phase,
        resource_state,
    }
}

fn combined_text(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

/// Last lines of engine output; the full text stays in the result log.
fn tail(text: &str) -> String {
    const MAX_LINES: usize = 40;
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join("\n")
}
