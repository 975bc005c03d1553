//! Domain types and validators for harness and suite configuration.
//!
//! Pure functions only: no I/O and no async. Paths in a
//! suite are resolved against the suite file's directory, which callers pass
//! in.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::assertion::ExpectedPattern;
use crate::domain::error::ConfigError;
use crate::domain::invocation::{ModuleInvocation, VarValue};
use crate::domain::retry::{Backoff, RegexSignature, RetryPolicy};

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_ENGINE_BINARY: &str = "terraform";
pub const DEFAULT_APPLY_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_DESTROY_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_OUTPUT_TIMEOUT_SECS: u64 = 60;

// ── Harness-level defaults ───────────────────────────────────────────────────

/// User-level defaults stored in `~/.infracheck/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    pub engine: EngineConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
}

/// Which engine binary to drive and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `terraform`, `tofu`, or a path to a compatible binary.
    pub binary: String,
    /// Pass `-no-color` to every command.
    pub no_color: bool,
    /// `-parallelism=N` for apply and destroy.
    pub parallelism: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_ENGINE_BINARY.to_string(),
            no_color: true,
            parallelism: None,
        }
    }
}

/// Retry overrides. Unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub backoff: Option<Backoff>,
    /// Drop the built-in transient signatures.
    pub disable_defaults: Option<bool>,
    pub extra_signatures: Vec<SignatureConfig>,
}

/// A user-supplied transient error signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureConfig {
    pub pattern: String,
    #[serde(default)]
    pub description: String,
}

/// Deadline overrides in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub apply_secs: Option<u64>,
    pub destroy_secs: Option<u64>,
    pub output_secs: Option<u64>,
}

impl RetryConfig {
    /// `self` overridden by `over`; extra signatures accumulate.
    #[must_use]
    pub fn layered(&self, over: &RetryConfig) -> RetryConfig {
        let mut extra_signatures = self.extra_signatures.clone();
        extra_signatures.extend(over.extra_signatures.iter().cloned());
        RetryConfig {
            max_attempts: over.max_attempts.or(self.max_attempts),
            backoff: over.backoff.or(self.backoff),
            disable_defaults: over.disable_defaults.or(self.disable_defaults),
            extra_signatures,
        }
    }

    /// Build the effective policy.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero or a signature fails to
    /// compile.
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let mut policy = if self.disable_defaults.unwrap_or(false) {
            RetryPolicy::none().with_backoff(Backoff::default())
        } else {
            RetryPolicy::default()
        };
        if let Some(max) = self.max_attempts {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "retry.max_attempts".to_string(),
                    value: max.to_string(),
                    hint: "At least one attempt is required.".to_string(),
                }
                .into());
            }
            policy = policy.with_max_attempts(max);
        } else if self.disable_defaults.unwrap_or(false) {
            policy = policy.with_max_attempts(crate::domain::retry::DEFAULT_MAX_ATTEMPTS);
        }
        if let Some(backoff) = self.backoff {
            policy = policy.with_backoff(backoff);
        }
        for sig in &self.extra_signatures {
            let description = if sig.description.is_empty() {
                sig.pattern.clone()
            } else {
                sig.description.clone()
            };
            policy = policy.with_signature(RegexSignature::new(&sig.pattern, description)?);
        }
        Ok(policy)
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn layered(&self, over: &TimeoutConfig) -> TimeoutConfig {
        TimeoutConfig {
            apply_secs: over.apply_secs.or(self.apply_secs),
            destroy_secs: over.destroy_secs.or(self.destroy_secs),
            output_secs: over.output_secs.or(self.output_secs),
        }
    }

    /// Resolve to concrete deadlines.
    ///
    /// # Errors
    ///
    /// Returns an error if any timeout is zero.
    pub fn to_timeouts(&self) -> Result<Timeouts> {
        let pick = |key: &str, value: Option<u64>, default: u64| -> Result<Duration> {
            let secs = value.unwrap_or(default);
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: format!("timeouts.{key}"),
                    value: "0".to_string(),
                    hint: "Timeouts must be at least one second.".to_string(),
                }
                .into());
            }
            Ok(Duration::from_secs(secs))
        };
        Ok(Timeouts {
            apply: pick("apply_secs", self.apply_secs, DEFAULT_APPLY_TIMEOUT_SECS)?,
            destroy: pick("destroy_secs", self.destroy_secs, DEFAULT_DESTROY_TIMEOUT_SECS)?,
            output: pick("output_secs", self.output_secs, DEFAULT_OUTPUT_TIMEOUT_SECS)?,
        })
    }
}

/// Concrete deadlines for one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Budget for init + apply including backoff waits.
    pub apply: Duration,
    pub destroy: Duration,
    /// Per-output budget.
    pub output: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            apply: Duration::from_secs(DEFAULT_APPLY_TIMEOUT_SECS),
            destroy: Duration::from_secs(DEFAULT_DESTROY_TIMEOUT_SECS),
            output: Duration::from_secs(DEFAULT_OUTPUT_TIMEOUT_SECS),
        }
    }
}

// ── Suite schema ─────────────────────────────────────────────────────────────

/// A suite file: shared settings plus the cases to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Run cases concurrently.
    #[serde(default = "default_true")]
    pub parallel: bool,
    #[serde(default)]
    pub cases: Vec<CaseConfig>,
}

/// One module invocation and its expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    pub name: String,
    /// Module directory, relative to the suite file.
    pub module: PathBuf,
    /// Run against a private temporary copy of the module directory.
    #[serde(default)]
    pub copy_to_temp: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub vars: BTreeMap<String, VarValue>,
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
    /// Destroy resources when the case finishes.
    #[serde(default = "default_true")]
    pub teardown: bool,
    #[serde(default)]
    pub expect: Vec<ExpectationConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// `output` must match `pattern`. `key` selects an entry of a map output,
/// then `index` an element of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationConfig {
    pub output: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    pub pattern: String,
}

fn default_true() -> bool {
    true
}

// ── Resolved case ────────────────────────────────────────────────────────────

/// Whether destroy runs at the end of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPolicy {
    Always,
    /// Caller opted out, e.g. to inspect resources by hand.
    Suppressed,
}

/// A case with every layer applied and every value validated.
#[derive(Debug, Clone)]
pub struct ResolvedCase {
    pub name: String,
    pub invocation: ModuleInvocation,
    pub expectations: Vec<ExpectedPattern>,
    pub policy: RetryPolicy,
    pub timeouts: Timeouts,
    pub teardown: TeardownPolicy,
    pub copy_to_temp: bool,
}

/// What `validate` prints for one resolved case.
#[derive(Debug, Clone, Serialize)]
pub struct CasePlan {
    pub name: String,
    pub module: String,
    pub copy_to_temp: bool,
    pub teardown: bool,
    /// `-var` arguments exactly as they will be passed.
    pub var_args: Vec<String>,
    /// `(label, pattern)` per expectation.
    pub expectations: Vec<(String, String)>,
    pub max_attempts: u32,
    pub apply_timeout_secs: u64,
    pub destroy_timeout_secs: u64,
    pub output_timeout_secs: u64,
}

impl From<&ResolvedCase> for CasePlan {
    fn from(case: &ResolvedCase) -> Self {
        Self {
            name: case.name.clone(),
            module: case.invocation.module_dir().display().to_string(),
            copy_to_temp: case.copy_to_temp,
            teardown: case.teardown == TeardownPolicy::Always,
            var_args: case.invocation.var_args(),
            expectations: case
                .expectations
                .iter()
                .map(|e| (e.label(), e.pattern().to_string()))
                .collect(),
            max_attempts: case.policy.max_attempts(),
            apply_timeout_secs: case.timeouts.apply.as_secs(),
            destroy_timeout_secs: case.timeouts.destroy.as_secs(),
            output_timeout_secs: case.timeouts.output.as_secs(),
        }
    }
}

/// Options from the command line that shape resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Suppress teardown for every case.
    pub keep_resources: bool,
    /// Only resolve these cases (all when empty).
    pub only: Vec<String>,
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Structural checks that need no resolution.
///
/// # Errors
///
/// Returns an error if the suite has no cases, a case name is empty or
/// duplicated, or a pattern does not compile.
pub fn validate_suite(suite: &SuiteFile) -> Result<()> {
    if suite.cases.is_empty() {
        return Err(ConfigError::NoCases.into());
    }
    let mut seen = HashSet::new();
    for (index, case) in suite.cases.iter().enumerate() {
        if case.name.trim().is_empty() {
            return Err(ConfigError::EmptyCaseName { index }.into());
        }
        if !seen.insert(case.name.as_str()) {
            return Err(ConfigError::DuplicateCase(case.name.clone()).into());
        }
        for exp in &case.expect {
            if let Err(e) = regex::Regex::new(&exp.pattern) {
                return Err(ConfigError::InvalidPattern {
                    case: case.name.clone(),
                    output: exp.output.clone(),
                    message: e.to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Effective engine settings: suite over user defaults.
#[must_use]
pub fn resolve_engine(suite: &SuiteFile, harness: &HarnessConfig) -> EngineConfig {
    suite.engine.clone().unwrap_or_else(|| harness.engine.clone())
}

/// Apply every configuration layer and build the cases to run.
///
/// Layers, lowest first: built-in defaults, `harness`, suite-level blocks,
/// case-level blocks. Relative paths are joined onto `base_dir`.
///
/// # Errors
///
/// Returns an error if validation fails, a `--case` filter names an unknown
/// case, or any invocation, pattern, policy or timeout is invalid.
pub fn resolve_cases(
    suite: &SuiteFile,
    harness: &HarnessConfig,
    base_dir: &Path,
    opts: &ResolveOptions,
) -> Result<Vec<ResolvedCase>> {
    validate_suite(suite)?;
    for name in &opts.only {
        if !suite.cases.iter().any(|c| &c.name == name) {
            return Err(ConfigError::UnknownCase(name.clone()).into());
        }
    }

    let suite_retry = harness.retry.layered(&suite.retry);
    let suite_timeouts = harness.timeouts.layered(&suite.timeouts);

    suite
        .cases
        .iter()
        .filter(|c| opts.only.is_empty() || opts.only.contains(&c.name))
        .map(|case| {
            let mut builder = ModuleInvocation::builder(base_dir.join(&case.module))
                .vars(case.vars.clone())
                .envs(case.env.clone());
            for file in &case.var_files {
                builder = builder.var_file(base_dir.join(file));
            }
            for (key, value) in &case.backend_config {
                builder = builder.backend_config(key.clone(), value.clone());
            }
            let invocation = builder.build()?;

            let expectations = case
                .expect
                .iter()
                .map(|e| {
                    let mut p = ExpectedPattern::new(e.output.clone(), &e.pattern)?;
                    if let Some(key) = &e.key {
                        p = p.with_key(key.clone());
                    }
                    if let Some(index) = e.index {
                        p = p.with_index(index);
                    }
                    Ok(p)
                })
                .collect::<Result<Vec<_>>>()?;

            let teardown = if opts.keep_resources || !case.teardown {
                TeardownPolicy::Suppressed
            } else {
                TeardownPolicy::Always
            };

            Ok(ResolvedCase {
                name: case.name.clone(),
                invocation,
                expectations,
                policy: suite_retry.layered(&case.retry).to_policy()?,
                timeouts: suite_timeouts.layered(&case.timeouts).to_timeouts()?,
                teardown,
                copy_to_temp: case.copy_to_temp,
            })
        })
        .collect()
}

// ── Unit tests ───────────────────────────────────────────────────────────────
