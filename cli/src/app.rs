//! Application context — unified state passed to every command handler.
//!
//! `AppContext` replaces per-command construction of `OutputContext` and the
//! config store. Adding a new cross-cutting concern requires only one field
//! change here.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::{ConfigError, HarnessError, HarnessConfig};
use crate::infra::config::YamlConfigStore;
use crate::output::{OutputContext, json};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// User-level defaults.
    pub config_store: YamlConfigStore,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    #[must_use]
    pub fn new(flags: &AppFlags) -> Self {
        let mode = if flags.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        // JSON output must stay machine-readable: no progress lines on stdout.
        let quiet = flags.quiet || mode == OutputMode::Json;
        Self {
            output: OutputContext::new(flags.no_color, quiet),
            mode,
            config_store: YamlConfigStore::default(),
        }
    }

    /// Load user-level defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid.
    pub fn harness_config(&self) -> Result<HarnessConfig> {
        self.config_store.load()
    }

    /// Report a command failure in the active output mode.
    pub fn report_error(&self, err: &anyhow::Error) {
        match self.mode {
            OutputMode::Json => match json::format_error(&format!("{err:#}"), error_code(err)) {
                Ok(obj) => println!("{obj}"),
                Err(_) => eprintln!("Error: {err:#}"),
            },
            OutputMode::Human => self.output.error(&format!("{err:#}")),
        }
    }
}

/// Machine-readable code for an error chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<HarnessError>() {
        return e.code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return "config_error";
    }
    "error"
}
