//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::domain::{HarnessConfig, ModuleInvocation};

// ── Value Types ───────────────────────────────────────────────────────────────

/// One process invocation: program, arguments, working directory and extra
/// environment (added on top of the inherited environment).
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub dir: Option<&'a Path>,
    pub env: &'a [(String, String)],
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// How long a child may take to exit after being interrupted, before it is
/// killed. The engine persists state during this window.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(30);

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, cmd: &CommandSpec<'_>) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child is interrupted, then killed if it is still
    /// running after [`INTERRUPT_GRACE`] (never left orphaned), and the
    /// error must downcast to `domain::CommandTimedOut`.
    async fn run_with_timeout(&self, cmd: &CommandSpec<'_>, timeout: Duration) -> Result<Output>;
}

// ── Provisioning Engine Port ──────────────────────────────────────────────────

/// The engine collaborator: init, apply, output, destroy for one module.
///
/// Every step returns the raw process output; interpreting exit status and
/// text is the executor's job.
#[allow(async_fn_in_trait)]
pub trait ProvisioningEngine {
    /// Whether the invocation's module location holds a module definition.
    fn module_exists(&self, invocation: &ModuleInvocation) -> bool;
    /// Initialize the working directory (providers, backend).
    async fn init(&self, invocation: &ModuleInvocation, timeout: Duration) -> Result<Output>;
    /// Provision resources.
    async fn apply(&self, invocation: &ModuleInvocation, timeout: Duration) -> Result<Output>;
    /// Read one named output as a JSON document.
    async fn output(
        &self,
        invocation: &ModuleInvocation,
        name: &str,
        timeout: Duration,
    ) -> Result<Output>;
    /// Deprovision everything the invocation created.
    async fn destroy(&self, invocation: &ModuleInvocation, timeout: Duration) -> Result<Output>;
    /// Engine version as a JSON document.
    async fn version(&self) -> Result<Output>;
}

// ── Module Workspace Port ─────────────────────────────────────────────────────

/// Prepares the directory a case runs in.
pub trait ModuleWorkspace {
    /// Copy the module at `source` into a private directory.
    ///
    /// Returns `(path, guard)` where `path` is the copied module directory
    /// and `guard` deletes it when dropped.
    fn isolate(&self, source: &Path) -> Result<(PathBuf, Box<dyn std::any::Any>)>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Config Store Port ─────────────────────────────────────────────────────────

/// Loads user-level harness defaults.
pub trait ConfigStore {
    /// Load the configuration, or defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<HarnessConfig>;
    /// Location of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}
