//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

// ── Harness taxonomy ──────────────────────────────────────────────────────────

/// Engine step that was running when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Apply,
    Output,
    Destroy,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Apply => "apply",
            Self::Output => "output",
            Self::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

/// What is known about the resources behind an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// The apply step never ran; nothing was created.
    NotCreated,
    /// Resources exist and have not been destroyed.
    Retained,
    /// Destroy completed successfully.
    Destroyed,
    /// An apply or destroy was interrupted; resources may have leaked.
    Unknown,
}

/// Errors produced by one harness invocation.
#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient {phase} failure ({signature}) after {attempts} attempt(s):\n{message}")]
    TransientProvisioning {
        phase: Phase,
        signature: String,
        attempts: u32,
        message: String,
    },

    #[error("{phase} failed after {attempts} attempt(s):\n{message}")]
    TerminalProvisioning {
        phase: Phase,
        attempts: u32,
        message: String,
    },

    #[error("output '{name}' not found: {reason}")]
    OutputNotFound { name: String, reason: String },

    #[error("{0}")]
    AssertionFailure(String),

    #[error("{phase} timed out after {}s; resource state is {}", .after.as_secs(), state_label(.resource_state))]
    Timeout {
        phase: Phase,
        after: Duration,
        resource_state: ResourceState,
    },

    #[error("{phase} interrupted; resource state is {}", state_label(.resource_state))]
    Interrupted {
        phase: Phase,
        resource_state: ResourceState,
    },
}

impl HarnessError {
    /// Short machine-readable code used in JSON reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::TransientProvisioning { .. } => "transient_provisioning_error",
            Self::TerminalProvisioning { .. } => "terminal_provisioning_error",
            Self::OutputNotFound { .. } => "output_not_found",
            Self::AssertionFailure(_) => "assertion_failure",
            Self::Timeout { .. } => "timeout",
            Self::Interrupted { .. } => "interrupted",
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Resource state carried by a timeout or interruption.
    #[must_use]
    pub fn resource_state(&self) -> Option<ResourceState> {
        match self {
            Self::Timeout { resource_state, .. } | Self::Interrupted { resource_state, .. } => {
                Some(*resource_state)
            }
            _ => None,
        }
    }

    /// Restate the resource state of a timeout or interruption once
    /// teardown has settled it. Other errors are returned unchanged.
    #[must_use]
    pub fn with_resource_state(self, state: ResourceState) -> Self {
        match self {
            Self::Timeout { phase, after, .. } => Self::Timeout {
                phase,
                after,
                resource_state: state,
            },
            Self::Interrupted { phase, .. } => Self::Interrupted {
                phase,
                resource_state: state,
            },
            other => other,
        }
    }
}

fn state_label(state: &ResourceState) -> &'static str {
    match state {
        ResourceState::NotCreated => "not created",
        ResourceState::Retained => "retained",
        ResourceState::Destroyed => "destroyed",
        ResourceState::Unknown => "UNKNOWN (possible resource leak, inspect manually)",
    }
}

// ── Runner signal ─────────────────────────────────────────────────────────────

/// Raised by `CommandRunner` implementations when a child process is killed
/// because its deadline elapsed. Services downcast to this to tell timeouts
/// apart from ordinary spawn failures.
#[derive(Debug, Error)]
#[error("{program} timed out after {}s", .after.as_secs())]
pub struct CommandTimedOut {
    pub program: String,
    pub after: Duration,
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to suite and harness configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("suite declares no cases")]
    NoCases,

    #[error("case #{index} has an empty name")]
    EmptyCaseName { index: usize },

    #[error("duplicate case name '{0}'")]
    DuplicateCase(String),

    #[error("case '{case}': invalid pattern for output '{output}': {message}")]
    InvalidPattern {
        case: String,
        output: String,
        message: String,
    },

    #[error("invalid value for {key}: {value}\n\n{hint}")]
    InvalidValue {
        key: String,
        value: String,
        hint: String,
    },

    #[error("no case named '{0}' in suite")]
    UnknownCase(String),
}
