//! Per-case and per-run reports, and the exit codes derived from them.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::assertion::AssertionOutcome;
use crate::domain::error::ResourceState;
use crate::domain::lifecycle::InvocationState;

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_ASSERTION_FAILED: i32 = 1;
pub const EXIT_PROVISIONING_FAILED: i32 = 3;
pub const EXIT_RESOURCE_STATE_UNKNOWN: i32 = 4;

/// What happened at teardown time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TeardownStatus {
    Destroyed,
    /// Suppressed by the caller (e.g. `--keep`).
    Skipped,
    /// Apply was never reached; nothing to destroy.
    NotRequired,
    Failed { message: String },
    TimedOut { after_secs: u64 },
    /// Destroy never ran because the run was abandoned mid-case.
    Abandoned,
}

impl TeardownStatus {
    /// Resource state after teardown, given the state provisioning left.
    #[must_use]
    pub fn resulting_state(&self, after_provisioning: ResourceState) -> ResourceState {
        match self {
            Self::Destroyed if after_provisioning == ResourceState::Unknown => {
                ResourceState::Unknown
            }
            Self::Destroyed => ResourceState::Destroyed,
            Self::Skipped | Self::NotRequired => after_provisioning,
            Self::Failed { .. } | Self::TimedOut { .. } | Self::Abandoned => ResourceState::Unknown,
        }
    }
}

/// Distinct user-visible outcomes of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOutcome {
    Passed,
    /// Provisioning succeeded but at least one assertion failed.
    AssertionFailed,
    /// Configuration or provisioning error.
    ProvisioningFailed,
    /// An apply or destroy deadline elapsed; resource state is unknown.
    TimedOut,
    /// The run was cancelled before the case finished.
    Interrupted,
}

/// Everything reported for one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub module: String,
    pub outcome: CaseOutcome,
    pub apply_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub assertions: Vec<AssertionOutcome>,
    pub teardown: TeardownStatus,
    pub resource_state: ResourceState,
    /// Lifecycle state the invocation ended in.
    pub state: InvocationState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CaseReport {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.resource_state == ResourceState::Unknown {
            return EXIT_RESOURCE_STATE_UNKNOWN;
        }
        match self.outcome {
            CaseOutcome::Passed => EXIT_PASSED,
            CaseOutcome::AssertionFailed => EXIT_ASSERTION_FAILED,
            CaseOutcome::ProvisioningFailed | CaseOutcome::Interrupted => EXIT_PROVISIONING_FAILED,
            CaseOutcome::TimedOut => EXIT_RESOURCE_STATE_UNKNOWN,
        }
    }
}

/// Report for a whole suite run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub suite: String,
    pub cases: Vec<CaseReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|c| c.outcome == CaseOutcome::Passed)
    }

    /// Most severe exit code across all cases.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.cases
            .iter()
            .map(CaseReport::exit_code)
            .max_by_key(|code| severity(*code))
            .unwrap_or(EXIT_PASSED)
    }
}

fn severity(code: i32) -> u8 {
    match code {
        EXIT_RESOURCE_STATE_UNKNOWN => 3,
        EXIT_PROVISIONING_FAILED => 2,
        EXIT_ASSERTION_FAILED => 1,
        _ => 0,
    }
}
