//! Domain layer — pure harness logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod assertion;
pub mod config;
pub mod error;
pub mod invocation;
pub mod lifecycle;
pub mod output;
pub mod provisioning;
pub mod report;
pub mod retry;

pub use assertion::{AssertionOutcome, AssertionReport, ExpectedPattern};
pub use config::{
    CasePlan, EngineConfig, HarnessConfig, ResolveOptions, ResolvedCase, SuiteFile,
    TeardownPolicy, Timeouts, resolve_cases, resolve_engine, validate_suite,
};
pub use error::{CommandTimedOut, ConfigError, HarnessError, Phase, ResourceState};
pub use invocation::{ModuleInvocation, VarValue};
pub use lifecycle::{InvocationState, Lifecycle};
pub use output::OutputValue;
pub use provisioning::ProvisioningResult;
pub use report::{CaseOutcome, CaseReport, RunReport, TeardownStatus};
pub use retry::{Backoff, Classification, ErrorSignature, RegexSignature, RetryPolicy};
