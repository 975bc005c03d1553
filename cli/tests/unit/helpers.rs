//! Shared test helpers: output constructors and case builders.

#![allow(dead_code)]

use std::process::{ExitStatus, Output};

use infracheck::domain::{
    Backoff, ExpectedPattern, ModuleInvocation, ResolvedCase, RetryPolicy, TeardownPolicy,
    Timeouts,
};

// ── Cross-platform ExitStatus construction ───────────────────────────────────

/// Build an `ExitStatus` from a logical exit code (0 = success, non-zero = failure).
///
/// On Unix the raw wait-status encodes the exit code in bits 8–15, so we shift.
/// On Windows `ExitStatusExt::from_raw` takes the exit code directly.
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

// ── Output constructors ──────────────────────────────────────────────────────

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn err_output(code: i32, stderr: &[u8]) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.to_vec(),
    }
}

// ── Engine messages ──────────────────────────────────────────────────────────

pub const REGISTRY_FAILURE: &str = "Error: Failed to query available provider packages\n\n\
Could not retrieve the list of available versions for provider hashicorp/aws: \
could not connect to registry.terraform.io: Failed to request discovery document";

pub const ACCESS_DENIED: &str =
    "Error: creating ECR Repository (jobtest): AccessDeniedException: User is not authorized";

pub const THROTTLED: &str =
    "Error: creating ECS Cluster (ecs-devxp): ThrottlingException: Rate exceeded";

pub const REPOSITORY_URL: &str = "\"123456789012.dkr.ecr.us-east-1.amazonaws.com/jobtest\"";

pub const JOBTEST_PATTERN: &str = r"\d{12}.dkr.ecr.us-east-1.amazonaws.com/jobtest";

// ── Case builders ────────────────────────────────────────────────────────────

/// The root-module invocation with the jobtest variables.
pub fn jobtest_invocation() -> ModuleInvocation {
    ModuleInvocation::builder("/work/modules/root")
        .var("name", "jobtest")
        .var("cluster_name", "ecs-devxp")
        .var("cron", "* * * * ? *")
        .var("subnets", Vec::<String>::new())
        .env("AWS_DEFAULT_REGION", "us-east-1")
        .build()
        .expect("valid invocation")
}

/// Default transient signatures, `max_attempts` attempts, fixed 5s backoff.
pub fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_backoff(Backoff::Fixed { secs: 5 })
}

pub fn repository_url_expectation() -> ExpectedPattern {
    ExpectedPattern::new("repository_url", JOBTEST_PATTERN).expect("valid pattern")
}

pub fn case(name: &str, expectations: Vec<ExpectedPattern>, max_attempts: u32) -> ResolvedCase {
    ResolvedCase {
        name: name.to_string(),
        invocation: jobtest_invocation(),
        expectations,
        policy: policy(max_attempts),
        timeouts: Timeouts::default(),
        teardown: TeardownPolicy::Always,
        copy_to_temp: false,
    }
}
