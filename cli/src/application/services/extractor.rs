//! Output extractor: read named outputs of a successfully provisioned module.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::ProvisioningEngine;
use crate::application::services::executor::retry_step;
use crate::domain::{HarnessError, ModuleInvocation, OutputValue, Phase, ProvisioningResult, RetryPolicy};

/// Read output `name`.
///
/// Transient engine failures are retried under `policy` within `budget`.
/// Nothing is read once `cancel` has fired.
///
/// # Errors
///
/// Returns `HarnessError::OutputNotFound` if `result` is failed or retired,
/// or the module exposes no such output. Other engine failures surface as
/// provisioning errors, `Timeout` or `Interrupted`.
pub async fn extract(
    engine: &impl ProvisioningEngine,
    invocation: &ModuleInvocation,
    result: &ProvisioningResult,
    name: &str,
    policy: &RetryPolicy,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<OutputValue, HarnessError> {
    result.ensure_outputs_readable(name)?;

    let mut log = String::new();
    let step = retry_step(Phase::Output, policy, budget, cancel, &mut log, move |remaining| {
        engine.output(invocation, name, remaining)
    })
    .await;

    match step.outcome {
        Ok(output) => OutputValue::from_json(name, &output.stdout),
        Err(HarnessError::TerminalProvisioning { message, .. }) if is_missing_output(&message) => {
            Err(HarnessError::OutputNotFound {
                name: name.to_string(),
                reason: "module does not declare this output".to_string(),
            })
        }
        Err(e) => Err(e),
    }
}

/// Engine messages for an undeclared output, across engine versions.
fn is_missing_output(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "not found",
        "could not be found",
        "No outputs found",
        "The state file either has no outputs defined",
    ];
    message.contains("utput") && MARKERS.iter().any(|m| message.contains(m))
}
