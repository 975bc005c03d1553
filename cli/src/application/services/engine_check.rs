//! Application service — engine version check.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result, bail};
use semver::Version;

use crate::application::ports::ProvisioningEngine;

/// Oldest engine release whose CLI flags and JSON output we rely on.
pub const MIN_ENGINE_VERSION: Version = Version::new(1, 0, 0);

/// Query the engine and check it is recent enough.
///
/// # Errors
///
/// Returns an error if the engine cannot be run, its version output cannot
/// be parsed, or it is older than [`MIN_ENGINE_VERSION`].
pub async fn check_engine(engine: &impl ProvisioningEngine) -> Result<Version> {
    let output = engine.version().await.context("failed to run engine")?;
    if !output.status.success() {
        bail!(
            "engine version check failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let version = parse_version(&String::from_utf8_lossy(&output.stdout))?;
    if version < MIN_ENGINE_VERSION {
        bail!("engine version {version} is older than the minimum supported {MIN_ENGINE_VERSION}");
    }
    Ok(version)
}

/// Parse `version -json` output, falling back to the plain `vX.Y.Z` banner
/// printed by older releases.
///
/// # Errors
///
/// Returns an error if no semantic version can be found.
pub fn parse_version(stdout: &str) -> Result<Version> {
    let raw = match serde_json::from_str::<serde_json::Value>(stdout) {
        Ok(json) => json
            .get("terraform_version")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .context("engine version output has no terraform_version field")?,
        Err(_) => stdout
            .split_whitespace()
            .find_map(|word| word.strip_prefix('v'))
            .map(str::to_string)
            .context("engine version output not recognised")?,
    };
    Version::parse(&raw).with_context(|| format!("invalid engine version '{raw}'"))
}
