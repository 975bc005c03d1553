//! Assertion controller: extract every expected output and evaluate its
//! pattern.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::application::ports::ProvisioningEngine;
use crate::application::services::extractor::extract;
use crate::domain::{
    AssertionReport, ExpectedPattern, HarnessError, ModuleInvocation, OutputValue,
    ProvisioningResult, RetryPolicy, Timeouts,
};

/// Assertion results plus the first engine failure hit while reading outputs.
#[derive(Debug, Default)]
pub struct Validation {
    pub report: AssertionReport,
    /// Set when an output could not be read for a reason other than the
    /// module not declaring it (engine error, timeout, cancellation).
    pub error: Option<HarnessError>,
}

/// Evaluate all `expectations` against the live module.
///
/// Each distinct output is read once even when several patterns refer to
/// it. Every expectation is evaluated; a failed one never short-circuits
/// the rest.
pub async fn validate(
    engine: &impl ProvisioningEngine,
    invocation: &ModuleInvocation,
    result: &ProvisioningResult,
    expectations: &[ExpectedPattern],
    policy: &RetryPolicy,
    timeouts: &Timeouts,
    cancel: &CancellationToken,
) -> Validation {
    let mut error = None;
    let mut extracted: BTreeMap<&str, Result<OutputValue, HarnessError>> = BTreeMap::new();
    for exp in expectations {
        if !extracted.contains_key(exp.output()) {
            let value = extract(
                engine,
                invocation,
                result,
                exp.output(),
                policy,
                timeouts.output,
                cancel,
            )
            .await;
            if let Err(e) = &value {
                tracing::warn!(output = exp.output(), error = %e, "could not read output");
                if error.is_none() && !matches!(e, HarnessError::OutputNotFound { .. }) {
                    error = Some(e.clone());
                }
            }
            extracted.insert(exp.output(), value);
        }
    }

    let outcomes = expectations
        .iter()
        .filter_map(|exp| extracted.get(exp.output()).map(|value| exp.evaluate(value)))
        .collect::<Vec<_>>();
    for outcome in outcomes.iter().filter(|o| !o.passed) {
        tracing::info!(
            output = %outcome.output,
            pattern = %outcome.pattern,
            actual = outcome.actual.as_deref().unwrap_or("<unavailable>"),
            "assertion failed"
        );
    }
    Validation {
        report: AssertionReport { outcomes },
        error,
    }
}
