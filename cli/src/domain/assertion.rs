//! Expected patterns and their evaluation against extracted outputs.
//!
//! Matching is plain `Regex::is_match` on the output's string form:
//! case-sensitive, anchored only where the pattern anchors itself, and
//! without trimming the value.

use regex::Regex;
use serde::Serialize;

use crate::domain::error::HarnessError;
use crate::domain::output::OutputValue;

/// An expectation on one output, or on one entry of a map or list output.
#[derive(Debug, Clone)]
pub struct ExpectedPattern {
    output: String,
    key: Option<String>,
    index: Option<usize>,
    pattern: Regex,
}

impl ExpectedPattern {
    /// # Errors
    ///
    /// Returns `HarnessError::Configuration` if the output name is empty or
    /// the pattern does not compile.
    pub fn new(output: impl Into<String>, pattern: &str) -> Result<Self, HarnessError> {
        let output = output.into();
        if output.is_empty() {
            return Err(HarnessError::Configuration(
                "expected pattern names an empty output".to_string(),
            ));
        }
        let pattern = Regex::new(pattern).map_err(|e| {
            HarnessError::Configuration(format!("invalid pattern for output '{output}': {e}"))
        })?;
        Ok(Self {
            output,
            key: None,
            index: None,
            pattern,
        })
    }

    /// Select one entry of a map output instead of the whole value.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Select one element of a list output instead of the whole value.
    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Display label: `name`, `name[key]`, `name[2]` or `name[key][2]`.
    #[must_use]
    pub fn label(&self) -> String {
        let mut label = self.output.clone();
        if let Some(key) = &self.key {
            label.push_str(&format!("[{key}]"));
        }
        if let Some(index) = self.index {
            label.push_str(&format!("[{index}]"));
        }
        label
    }

    /// Evaluate against the extraction result for this pattern's output.
    #[must_use]
    pub fn evaluate(&self, extracted: &Result<OutputValue, HarnessError>) -> AssertionOutcome {
        let target = extracted.clone().and_then(|value| {
            let value = match &self.key {
                Some(key) => value.entry(key)?,
                None => value,
            };
            match self.index {
                Some(index) => value.item(index),
                None => Ok(value),
            }
        });
        match target {
            Ok(value) => {
                let actual = value.as_match_text();
                let passed = self.pattern.is_match(&actual);
                AssertionOutcome {
                    output: self.label(),
                    pattern: self.pattern().to_string(),
                    reason: (!passed).then(|| "value does not match pattern".to_string()),
                    actual: Some(actual),
                    passed,
                }
            }
            Err(e) => AssertionOutcome {
                output: self.label(),
                pattern: self.pattern().to_string(),
                actual: None,
                passed: false,
                reason: Some(e.to_string()),
            },
        }
    }
}

/// Result of one `(OutputValue, ExpectedPattern)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionOutcome {
    pub output: String,
    pub pattern: String,
    /// `None` when the output could not be read.
    pub actual: Option<String>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregate of every assertion for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssertionReport {
    pub outcomes: Vec<AssertionOutcome>,
}

impl AssertionReport {
    /// All pairs passed. A report with no pairs passes.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    /// Collapse into a single result for callers that want `?` semantics.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::AssertionFailure` listing every failed pair with
    /// its actual value and expected pattern.
    pub fn into_result(self) -> Result<(), HarnessError> {
        if self.passed() {
            return Ok(());
        }
        let lines: Vec<String> = self
            .failures()
            .map(|f| {
                let actual = f.actual.as_deref().unwrap_or("<unavailable>");
                format!(
                    "{}: expected match for /{}/, got \"{actual}\"{}",
                    f.output,
                    f.pattern,
                    f.reason
                        .as_deref()
                        .filter(|_| f.actual.is_none())
                        .map(|r| format!(" ({r})"))
                        .unwrap_or_default()
                )
            })
            .collect();
        Err(HarnessError::AssertionFailure(lines.join("\n")))
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
