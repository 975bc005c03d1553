//! Retry policy: which engine failures are transient and how long to wait
//! between attempts.
//!
//! Classification is a pluggable set of [`ErrorSignature`]s so new transient
//! failure modes can be registered without touching the retry loop.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::HarnessError;

/// Built-in transient error signatures: `(regex, description)`.
pub const DEFAULT_TRANSIENT_ERRORS: &[(&str, &str)] = &[
    // Provider plugins and registry
    (
        r"Failed to query available provider packages",
        "failed to retrieve provider plugin due to a transient network error",
    ),
    (
        r"could not query provider registry for",
        "failed to retrieve provider plugin due to a transient network error",
    ),
    (r"registry service is unreachable", "provider registry unreachable"),
    (r"Error installing provider", "provider plugin installation failed"),
    (r"unable to verify checksum", "provider download was truncated"),
    (r"unable to verify signature", "provider signature fetch failed"),
    (r"timeout while waiting for plugin to start", "provider plugin slow to start"),
    (r"timed out waiting for server handshake", "provider plugin handshake timed out"),
    // Transport
    (r"connection reset by peer", "connection reset by remote endpoint"),
    (r"TLS handshake timeout", "TLS handshake timed out"),
    (r"Client\.Timeout exceeded while awaiting headers", "HTTP client timeout"),
    (r"transport is closing", "remote API connection closed"),
    (r"i/o timeout", "network i/o timeout"),
    // Provider throttling
    (r"Throttling(Exception)?", "provider throttled the request"),
    (r"RequestLimitExceeded", "provider request limit exceeded"),
    (r"TooManyRequestsException", "provider request rate too high"),
    (r"Rate exceeded", "provider rate limit exceeded"),
    // Eventual consistency on freshly created identities
    (r"cannot be assumed by", "new IAM role not yet propagated"),
    (
        r"InvalidParameterValueException: The role defined for the function",
        "new IAM role not yet propagated",
    ),
    (r"does not exist or is not authorized", "new identity not yet visible"),
];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

// ── Classification ───────────────────────────────────────────────────────────

/// A predicate recognizing one family of transient failures.
pub trait ErrorSignature: Send + Sync + std::fmt::Debug {
    /// Whether `text` (combined engine stdout and stderr) shows this failure.
    fn matches(&self, text: &str) -> bool;
    /// Human-readable description used in logs and reports.
    fn description(&self) -> &str;
}

/// Regular-expression signature.
#[derive(Debug, Clone)]
pub struct RegexSignature {
    pattern: Regex,
    description: String,
}

impl RegexSignature {
    /// # Errors
    ///
    /// Returns `HarnessError::Configuration` if `pattern` does not compile.
    pub fn new(pattern: &str, description: impl Into<String>) -> Result<Self, HarnessError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            HarnessError::Configuration(format!("invalid retry signature '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            description: description.into(),
        })
    }
}

impl ErrorSignature for RegexSignature {
    fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// How a failed step should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Recognized transient failure; carries the signature description.
    Transient(String),
    Terminal,
}

// ── Backoff ──────────────────────────────────────────────────────────────────

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed {
        secs: u64,
    },
    Exponential {
        initial_secs: u64,
        factor: u32,
        max_secs: u64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed {
            secs: DEFAULT_BACKOFF.as_secs(),
        }
    }
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { secs } => Duration::from_secs(secs),
            Self::Exponential {
                initial_secs,
                factor,
                max_secs,
            } => {
                let exp = attempt.saturating_sub(1);
                let mult = u64::from(factor).saturating_pow(exp);
                Duration::from_secs(initial_secs.saturating_mul(mult).min(max_secs))
            }
        }
    }
}

// ── Policy ───────────────────────────────────────────────────────────────────

/// Transient signatures, attempt ceiling and backoff schedule.
///
/// Cheap to clone and safe to share across concurrent cases; never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    signatures: Vec<Arc<dyn ErrorSignature>>,
    max_attempts: u32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let signatures = DEFAULT_TRANSIENT_ERRORS
            .iter()
            .filter_map(|(pattern, description)| RegexSignature::new(pattern, *description).ok())
            .map(|s| Arc::new(s) as Arc<dyn ErrorSignature>)
            .collect();
        Self {
            signatures,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that recognizes nothing: every failure is terminal.
    #[must_use]
    pub fn none() -> Self {
        Self {
            signatures: Vec::new(),
            max_attempts: 1,
            backoff: Backoff::Fixed { secs: 0 },
        }
    }

    /// Override the attempt ceiling (clamped to at least one attempt).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Register an additional transient signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl ErrorSignature + 'static) -> Self {
        self.signatures.push(Arc::new(signature));
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    #[must_use]
    pub fn signatures(&self) -> &[Arc<dyn ErrorSignature>] {
        &self.signatures
    }

    /// Classify a failed step from its combined output.
    #[must_use]
    pub fn classify(&self, text: &str) -> Classification {
        self.signatures
            .iter()
            .find(|s| s.matches(text))
            .map_or(Classification::Terminal, |s| {
                Classification::Transient(s.description().to_string())
            })
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
