//! Infrastructure implementation of the `ProvisioningEngine` port.
//!
//! `TerraformCli<R>` routes every engine call through a `CommandRunner`, so
//! tests can inject a mock runner and inspect the exact arguments.

use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, CommandSpec, ProvisioningEngine};
use crate::domain::ModuleInvocation;
use crate::domain::config::EngineConfig;
use crate::infra::command_runner::TokioCommandRunner;

/// Adapter for `terraform` and CLI-compatible engines such as `tofu`.
pub struct TerraformCli<R: CommandRunner> {
    runner: R,
    config: EngineConfig,
}

impl<R: CommandRunner> TerraformCli<R> {
    pub fn new(runner: R, config: EngineConfig) -> Self {
        Self { runner, config }
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.config.binary
    }

    /// `init` arguments.
    #[must_use]
    pub fn init_args(&self, invocation: &ModuleInvocation) -> Vec<String> {
        let mut args = strings(&["init", "-input=false", "-upgrade=false"]);
        for (key, value) in invocation.backend_config() {
            args.push(format!("-backend-config={key}={value}"));
        }
        self.push_no_color(&mut args);
        args
    }

    /// `apply` arguments.
    #[must_use]
    pub fn apply_args(&self, invocation: &ModuleInvocation) -> Vec<String> {
        self.mutating_args(
            &["apply", "-input=false", "-auto-approve", "-lock=false"],
            invocation,
        )
    }

    /// `destroy` arguments; same variables as apply so the plan resolves.
    #[must_use]
    pub fn destroy_args(&self, invocation: &ModuleInvocation) -> Vec<String> {
        self.mutating_args(
            &["destroy", "-auto-approve", "-input=false", "-lock=false"],
            invocation,
        )
    }

    /// `output` arguments for one named output.
    #[must_use]
    pub fn output_args(name: &str) -> Vec<String> {
        let mut args = strings(&["output", "-no-color", "-json"]);
        args.push(name.to_string());
        args
    }

    fn mutating_args(&self, head: &[&str], invocation: &ModuleInvocation) -> Vec<String> {
        let mut args = strings(head);
        self.push_no_color(&mut args);
        if let Some(n) = self.config.parallelism {
            args.push(format!("-parallelism={n}"));
        }
        for file in invocation.var_files() {
            args.push(format!("-var-file={}", file.display()));
        }
        args.extend(invocation.var_args());
        args
    }

    fn push_no_color(&self, args: &mut Vec<String>) {
        if self.config.no_color {
            args.push("-no-color".to_string());
        }
    }

    async fn run_in(
        &self,
        invocation: &ModuleInvocation,
        args: &[String],
        timeout: Duration,
    ) -> Result<Output> {
        let env = invocation.command_env();
        let spec = CommandSpec {
            program: &self.config.binary,
            args,
            dir: Some(invocation.module_dir()),
            env: &env,
        };
        self.runner.run_with_timeout(&spec, timeout).await
    }
}

impl TerraformCli<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn with_default_runner(config: EngineConfig) -> Self {
        Self::new(TokioCommandRunner::default(), config)
    }
}

impl<R: CommandRunner> ProvisioningEngine for TerraformCli<R> {
    fn module_exists(&self, invocation: &ModuleInvocation) -> bool {
        let Ok(entries) = std::fs::read_dir(invocation.module_dir()) else {
            return false;
        };
        entries.flatten().any(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            entry.path().is_file() && (name.ends_with(".tf") || name.ends_with(".tf.json"))
        })
    }

    async fn init(&self, invocation: &ModuleInvocation, timeout: Duration) -> Result<Output> {
        self.run_in(invocation, &self.init_args(invocation), timeout)
            .await
            .with_context(|| format!("{} init", self.binary()))
    }

    async fn apply(&self, invocation: &ModuleInvocation, timeout: Duration) -> Result<Output> {
        self.run_in(invocation, &self.apply_args(invocation), timeout)
            .await
            .with_context(|| format!("{} apply", self.binary()))
    }

    async fn output(
        &self,
        invocation: &ModuleInvocation,
        name: &str,
        timeout: Duration,
    ) -> Result<Output> {
        self.run_in(invocation, &Self::output_args(name), timeout)
            .await
            .with_context(|| format!("{} output {name}", self.binary()))
    }

    async fn destroy(&self, invocation: &ModuleInvocation, timeout: Duration) -> Result<Output> {
        self.run_in(invocation, &self.destroy_args(invocation), timeout)
            .await
            .with_context(|| format!("{} destroy", self.binary()))
    }

    async fn version(&self) -> Result<Output> {
        let args = strings(&["version", "-json"]);
        let spec = CommandSpec {
            program: &self.config.binary,
            args: &args,
            dir: None,
            env: &[],
        };
        self.runner
            .run(&spec)
            .await
            .with_context(|| format!("{} version", self.binary()))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
