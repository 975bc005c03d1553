//! Run command — provision, check and tear down every case in a suite.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, OutputMode};
use crate::application::services::case_run::run_suite;
use crate::domain::{
    CaseOutcome, CaseReport, InvocationState, ResolveOptions, ResolvedCase, ResourceState,
    RunReport, TeardownStatus, resolve_cases, resolve_engine,
};
use crate::infra::config::load_suite;
use crate::infra::terraform::TerraformCli;
use crate::infra::workspace::TempDirWorkspace;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Suite file (YAML)
    pub suite: PathBuf,

    /// Only run the named case (repeatable)
    #[arg(long = "case", value_name = "NAME")]
    pub cases: Vec<String>,

    /// Keep provisioned resources for manual inspection (skip destroy)
    #[arg(long, env = "INFRACHECK_KEEP_RESOURCES")]
    pub keep: bool,

    /// Run cases one at a time even if the suite allows parallel runs
    #[arg(long)]
    pub sequential: bool,
}

/// Entry point for `infracheck run`. Returns the process exit code.
///
/// # Errors
///
/// Returns an error if the suite or user config cannot be loaded or does
/// not validate. Case failures are reported through the exit code.
pub async fn run(app: &AppContext, args: &RunArgs) -> Result<i32> {
    let harness = app.harness_config()?;
    let (suite, base_dir) = load_suite(&args.suite)?;
    let opts = ResolveOptions {
        keep_resources: args.keep,
        only: args.cases.clone(),
    };
    let cases = resolve_cases(&suite, &harness, &base_dir, &opts)?;
    let engine = TerraformCli::with_default_runner(resolve_engine(&suite, &harness));
    let parallel = suite.parallel && !args.sequential;
    if args.keep {
        app.output
            .warn("--keep set: provisioned resources will NOT be destroyed");
    }

    tracing::info!(
        suite = %args.suite.display(),
        cases = cases.len(),
        parallel,
        engine = engine.binary(),
        "starting run"
    );
    app.output.info(&format!(
        "running {} case(s) {}",
        cases.len(),
        if parallel { "in parallel" } else { "sequentially" }
    ));
    let reporter = TerminalReporter::new(&app.output);
    let started_at = Utc::now();
    let cancel = CancellationToken::new();
    let suite_run = run_suite(&engine, &TempDirWorkspace, &reporter, &cases, parallel, &cancel);
    tokio::pin!(suite_run);
    let reports = tokio::select! {
        reports = &mut suite_run => reports,
        _ = tokio::signal::ctrl_c() => {
            app.output.warn(
                "interrupted: stopping cases and tearing down what was provisioned \
                 (Ctrl-C again to abandon teardown)",
            );
            tracing::warn!("interrupted; cancelling cases");
            cancel.cancel();
            tokio::select! {
                reports = &mut suite_run => reports,
                _ = tokio::signal::ctrl_c() => {
                    tracing::error!("interrupted again; in-flight cases abandoned without teardown");
                    abandoned(&cases, started_at)
                }
            }
        }
    };

    let report = RunReport {
        suite: args.suite.display().to_string(),
        cases: reports,
        started_at,
        finished_at: Utc::now(),
    };
    match app.mode {
        OutputMode::Json => println!("{}", json::format_value(&report)?),
        OutputMode::Human => HumanRenderer::new(&app.output).render_report(&report),
    }
    Ok(report.exit_code())
}

/// Reports for a run abandoned by a second Ctrl-C.
///
/// Which cases had finished is not known once the run future is dropped, so
/// every case is reported with unknown resource state.
fn abandoned(cases: &[ResolvedCase], started_at: chrono::DateTime<Utc>) -> Vec<CaseReport> {
    let finished_at = Utc::now();
    cases
        .iter()
        .map(|case| CaseReport {
            name: case.name.clone(),
            module: case.invocation.module_dir().display().to_string(),
            outcome: CaseOutcome::Interrupted,
            apply_attempts: 0,
            error: Some("run abandoned before the case finished".to_string()),
            error_code: Some("abandoned".to_string()),
            assertions: Vec::new(),
            teardown: TeardownStatus::Abandoned,
            resource_state: ResourceState::Unknown,
            state: InvocationState::Created,
            started_at,
            finished_at,
        })
        .collect()
}
