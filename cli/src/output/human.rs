//! Human-readable terminal renderer.

use owo_colors::OwoColorize as _;

use crate::domain::{
    CaseOutcome, CasePlan, CaseReport, ResourceState, RunReport, TeardownStatus,
};
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the summary of a finished run.
    ///
    /// Failures and unknown resource states are printed even when `quiet`.
    pub fn render_report(&self, report: &RunReport) {
        if !self.ctx.quiet {
            println!();
            self.ctx.header(&format!("Results for {}", report.suite));
        }
        for case in &report.cases {
            self.render_case(case);
        }

        let passed = report
            .cases
            .iter()
            .filter(|c| c.outcome == CaseOutcome::Passed)
            .count();
        let summary = format!("{passed}/{} cases passed", report.cases.len());
        if report.passed() {
            self.ctx.success(&summary);
        } else {
            self.ctx.error(&summary);
        }
    }

    fn render_case(&self, case: &CaseReport) {
        let elapsed = (case.finished_at - case.started_at).num_seconds();
        let line = format!(
            "{} {} ({elapsed}s, {} apply attempt(s))",
            case.name.style(self.ctx.styles.bold),
            outcome_display(case.outcome),
            case.apply_attempts
        );
        match case.outcome {
            CaseOutcome::Passed => self.ctx.success(&line),
            _ => self.ctx.error(&line),
        }

        if !self.ctx.quiet {
            for assertion in &case.assertions {
                let actual = assertion.actual.as_deref().unwrap_or("<unavailable>");
                let detail = format!(
                    "    {}  /{}/  {}",
                    assertion.output,
                    assertion.pattern,
                    actual.style(self.ctx.styles.dim)
                );
                if assertion.passed {
                    println!("  {} {detail}", "✓".style(self.ctx.styles.success));
                } else {
                    println!("  {} {detail}", "✗".style(self.ctx.styles.error));
                    if let Some(reason) = &assertion.reason {
                        self.ctx.kv("      reason:", reason);
                    }
                }
            }
        }
        let error = case
            .error
            .as_ref()
            .filter(|_| case.outcome != CaseOutcome::AssertionFailed);
        for line in error.into_iter().flat_map(|e| e.lines()) {
            eprintln!("      {}", line.style(self.ctx.styles.dim));
        }
        self.ctx
            .kv("    teardown:", &teardown_display(&case.teardown));
        if case.resource_state == ResourceState::Unknown {
            self.ctx.error(&format!(
                "    resource state UNKNOWN for {}; inspect {} and destroy leftovers manually",
                case.name, case.module
            ));
        } else {
            self.ctx
                .kv("    resources:", resource_state_display(case.resource_state));
        }
    }

    /// Render the planned invocations of a validated suite.
    pub fn render_plan(&self, suite: &str, engine: &str, plans: &[CasePlan]) {
        if self.ctx.quiet {
            return;
        }
        self.ctx
            .success(&format!("{suite} is valid ({} case(s))", plans.len()));
        self.ctx.kv("Engine:", engine);
        for plan in plans {
            println!();
            self.ctx.header(&plan.name);
            self.ctx.kv("  module:", &plan.module);
            if plan.copy_to_temp {
                self.ctx.kv("  isolation:", "copied to a temporary directory");
            }
            if !plan.teardown {
                self.ctx.kv("  teardown:", "suppressed");
            }
            if !plan.var_args.is_empty() {
                self.ctx.kv("  vars:", &plan.var_args.join(" "));
            }
            for (label, pattern) in &plan.expectations {
                self.ctx.kv("  expect:", &format!("{label} =~ /{pattern}/"));
            }
            self.ctx.kv(
                "  limits:",
                &format!(
                    "{} attempt(s), apply {}s, destroy {}s, output {}s",
                    plan.max_attempts,
                    plan.apply_timeout_secs,
                    plan.destroy_timeout_secs,
                    plan.output_timeout_secs
                ),
            );
        }
    }
}

fn outcome_display(outcome: CaseOutcome) -> &'static str {
    match outcome {
        CaseOutcome::Passed => "passed",
        CaseOutcome::AssertionFailed => "assertion failed",
        CaseOutcome::ProvisioningFailed => "provisioning failed",
        CaseOutcome::TimedOut => "timed out",
        CaseOutcome::Interrupted => "interrupted",
    }
}

fn teardown_display(status: &TeardownStatus) -> String {
    match status {
        TeardownStatus::Destroyed => "destroyed".to_string(),
        TeardownStatus::Skipped => "skipped (resources kept)".to_string(),
        TeardownStatus::NotRequired => "not required".to_string(),
        TeardownStatus::Failed { message } => {
            let first = message.lines().next().unwrap_or_default();
            format!("FAILED: {first}")
        }
        TeardownStatus::TimedOut { after_secs } => format!("TIMED OUT after {after_secs}s"),
        TeardownStatus::Abandoned => "abandoned (interrupted)".to_string(),
    }
}

fn resource_state_display(state: ResourceState) -> &'static str {
    match state {
        ResourceState::NotCreated => "not created",
        ResourceState::Retained => "retained",
        ResourceState::Destroyed => "destroyed",
        ResourceState::Unknown => "unknown",
    }
}
