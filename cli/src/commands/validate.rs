//! Validate command — check a suite without provisioning anything.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::app::{AppContext, OutputMode};
use crate::application::ports::ProvisioningEngine;
use crate::application::services::engine_check::check_engine;
use crate::domain::report::EXIT_PASSED;
use crate::domain::{CasePlan, HarnessError, ResolveOptions, resolve_cases, resolve_engine};
use crate::infra::config::load_suite;
use crate::infra::terraform::TerraformCli;
use crate::output::human::HumanRenderer;
use crate::output::json;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Suite file (YAML)
    pub suite: PathBuf,

    /// Also run the engine and check its version
    #[arg(long)]
    pub check_engine: bool,
}

#[derive(Serialize)]
struct ValidateOutput<'a> {
    valid: bool,
    suite: String,
    engine: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_version: Option<String>,
    warnings: Vec<String>,
    cases: Vec<CasePlan>,
}

/// Entry point for `infracheck validate`. Returns the process exit code.
///
/// # Errors
///
/// Returns an error if the suite does not parse or validate, or a case's
/// module directory holds no module definition.
pub async fn run(app: &AppContext, args: &ValidateArgs) -> Result<i32> {
    let harness = app.harness_config()?;
    let (suite, base_dir) = load_suite(&args.suite)?;
    let cases = resolve_cases(&suite, &harness, &base_dir, &ResolveOptions::default())?;
    let engine = TerraformCli::with_default_runner(resolve_engine(&suite, &harness));

    for case in &cases {
        if !engine.module_exists(&case.invocation) {
            return Err(HarnessError::Configuration(format!(
                "case '{}': no module definition found at {}",
                case.name,
                case.invocation.module_dir().display()
            ))
            .into());
        }
    }

    let mut warnings = Vec::new();
    let mut engine_version = None;
    if args.check_engine {
        match check_engine(&engine).await {
            Ok(version) => engine_version = Some(version.to_string()),
            Err(e) => warnings.push(format!("{e:#}")),
        }
    }

    let plans: Vec<CasePlan> = cases.iter().map(CasePlan::from).collect();
    let suite_name = args.suite.display().to_string();
    match app.mode {
        OutputMode::Json => {
            let out = ValidateOutput {
                valid: true,
                suite: suite_name,
                engine: engine.binary(),
                engine_version,
                warnings,
                cases: plans,
            };
            println!("{}", json::format_value(&out)?);
        }
        OutputMode::Human => {
            HumanRenderer::new(&app.output).render_plan(&suite_name, engine.binary(), &plans);
            if let Some(version) = engine_version {
                app.output.kv("Engine version:", &version);
            }
            for warning in &warnings {
                app.output.warn(warning);
            }
        }
    }
    Ok(EXIT_PASSED)
}
