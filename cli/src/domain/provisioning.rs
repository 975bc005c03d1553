//! Result of the init + apply step for one invocation.

use crate::domain::error::{HarnessError, Phase, ResourceState};

/// Outcome of the retry-wrapped init + apply sequence.
///
/// Produced once by the executor and only mutated by teardown, which retires
/// it so outputs can no longer be read from destroyed resources.
#[derive(Debug, Clone)]
pub struct ProvisioningResult {
    /// Attempts made at the apply step (0 if init never succeeded).
    pub apply_attempts: u32,
    /// Attempts made at the init step.
    pub init_attempts: u32,
    /// Combined engine output of every attempt, in order.
    pub log: String,
    /// Terminal error; `None` on success.
    pub error: Option<HarnessError>,
    /// The apply command was started at least once, so resources may exist.
    pub reached_apply: bool,
    retired: bool,
}

impl ProvisioningResult {
    #[must_use]
    pub fn succeeded(init_attempts: u32, apply_attempts: u32, log: String) -> Self {
        Self {
            apply_attempts,
            init_attempts,
            log,
            error: None,
            reached_apply: true,
            retired: false,
        }
    }

    #[must_use]
    pub fn failed(
        error: HarnessError,
        init_attempts: u32,
        apply_attempts: u32,
        log: String,
    ) -> Self {
        Self {
            apply_attempts,
            init_attempts,
            log,
            error: Some(error),
            reached_apply: apply_attempts > 0,
            retired: false,
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the terminal error is a timeout during apply, which leaves the
    /// resource state ambiguous.
    #[must_use]
    pub fn apply_timed_out(&self) -> bool {
        matches!(
            self.error,
            Some(HarnessError::Timeout {
                phase: Phase::Apply,
                ..
            })
        )
    }

    /// What is known about resources immediately after provisioning.
    #[must_use]
    pub fn resource_state(&self) -> ResourceState {
        match self.error.as_ref().and_then(HarnessError::resource_state) {
            Some(state) => state,
            None if self.reached_apply => ResourceState::Retained,
            None => ResourceState::NotCreated,
        }
    }

    /// Gate for output extraction.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::OutputNotFound` for `name` if provisioning
    /// failed or the resources were already torn down.
    pub fn ensure_outputs_readable(&self, name: &str) -> Result<(), HarnessError> {
        if let Some(err) = &self.error {
            return Err(HarnessError::OutputNotFound {
                name: name.to_string(),
                reason: format!("provisioning did not succeed ({})", err.code()),
            });
        }
        if self.retired {
            return Err(HarnessError::OutputNotFound {
                name: name.to_string(),
                reason: "resources have been torn down".to_string(),
            });
        }
        Ok(())
    }

    /// Mark the provisioned resources as gone.
    pub fn retire(&mut self) {
        self.retired = true;
    }

    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired
    }
}
