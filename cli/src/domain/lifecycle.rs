//! Per-invocation lifecycle state machine.
//!
//! ```text
//! Created → Provisioning → Provisioned | Failed
//! Provisioned → Validating → Validated(pass | fail)
//! Provisioned | Validated | Failed → TornDown
//! ```
//!
//! `Failed → TornDown` is only legal when the apply step was reached, since
//! that is the only way partial resources can exist.

use serde::Serialize;

use crate::domain::error::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum InvocationState {
    Created,
    Provisioning,
    Provisioned,
    Failed { reached_apply: bool },
    Validating,
    Validated { passed: bool },
    TornDown,
}

impl InvocationState {
    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_advance_to(self, next: InvocationState) -> bool {
        use InvocationState::{
            Created, Failed, Provisioned, Provisioning, TornDown, Validated, Validating,
        };
        matches!(
            (self, next),
            (Created, Provisioning)
                | (Provisioning, Provisioned | Failed { .. })
                | (Provisioned, Validating | TornDown)
                | (Validating, Validated { .. })
                | (Validated { .. } | Failed { reached_apply: true }, TornDown)
        )
    }

    /// Outputs are readable only while provisioned resources are live.
    #[must_use]
    pub fn outputs_readable(self) -> bool {
        matches!(self, Self::Provisioned | Self::Validating)
    }
}

/// Tracks one invocation's state, rejecting illegal transitions.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: InvocationState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: InvocationState::Created,
        }
    }
}

impl Lifecycle {
    #[must_use]
    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Configuration` on an illegal transition; this
    /// always indicates a sequencing bug in the caller.
    pub fn advance(&mut self, next: InvocationState) -> Result<(), HarnessError> {
        if !self.state.can_advance_to(next) {
            return Err(HarnessError::Configuration(format!(
                "illegal lifecycle transition {:?} -> {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}
