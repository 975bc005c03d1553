//! Module invocation: the immutable set of inputs for one engine run.
//!
//! Pure functions only: no I/O and no async. Whether
//! the module location actually resolves is checked later by the executor.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::HarnessError;

/// Environment variable set on every engine command.
pub const AUTOMATION_ENV: (&str, &str) = ("TF_IN_AUTOMATION", "1");

// ── Variable values ──────────────────────────────────────────────────────────

/// A module input value, limited to what the engine's variable syntax can
/// express: primitives, lists and maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<VarValue>),
    Map(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// Render as an HCL literal suitable for `-var name=<literal>`.
    ///
    /// Top-level strings are passed raw; strings nested inside lists or maps
    /// are quoted and escaped.
    #[must_use]
    pub fn to_hcl(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => {
                let mut out = String::new();
                write_hcl(&mut out, other);
                out
            }
        }
    }

    /// Whether every number in the value is finite. NaN and infinities have
    /// no HCL literal.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
            Self::Map(entries) => entries.values().all(Self::is_finite),
            Self::Bool(_) | Self::Int(_) | Self::String(_) => true,
        }
    }
}

fn write_hcl(out: &mut String, value: &VarValue) {
    match value {
        VarValue::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        VarValue::Int(i) => {
            let _ = write!(out, "{i}");
        }
        VarValue::Float(f) => {
            let _ = write!(out, "{f}");
        }
        VarValue::String(s) => write_quoted(out, s),
        VarValue::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_hcl(out, item);
            }
            out.push(']');
        }
        VarValue::Map(entries) => {
            out.push('{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_quoted(out, key);
                out.push_str(" = ");
                write_hcl(out, item);
            }
            out.push('}');
        }
    }
}

fn write_quoted(out: &mut String, s: &str) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // `${` and `%{` would start template interpolation
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for VarValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl<T: Into<VarValue>> From<Vec<T>> for VarValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

// ── Invocation ───────────────────────────────────────────────────────────────

/// Everything the engine needs for one run of one module.
///
/// Constructed once per case through [`ModuleInvocation::builder`] and never
/// mutated afterwards; every service takes it by shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInvocation {
    module_dir: PathBuf,
    vars: BTreeMap<String, VarValue>,
    env: BTreeMap<String, String>,
    var_files: Vec<PathBuf>,
    backend_config: BTreeMap<String, String>,
}

impl ModuleInvocation {
    /// Start building an invocation for the module at `module_dir`.
    pub fn builder(module_dir: impl Into<PathBuf>) -> InvocationBuilder {
        InvocationBuilder {
            module_dir: module_dir.into(),
            vars: Vec::new(),
            env: Vec::new(),
            var_files: Vec::new(),
            backend_config: Vec::new(),
        }
    }

    #[must_use]
    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    #[must_use]
    pub fn vars(&self) -> &BTreeMap<String, VarValue> {
        &self.vars
    }

    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    #[must_use]
    pub fn var_files(&self) -> &[PathBuf] {
        &self.var_files
    }

    #[must_use]
    pub fn backend_config(&self) -> &BTreeMap<String, String> {
        &self.backend_config
    }

    /// The same invocation pointed at another copy of the module.
    #[must_use]
    pub fn relocated(&self, module_dir: impl Into<PathBuf>) -> ModuleInvocation {
        ModuleInvocation {
            module_dir: module_dir.into(),
            ..self.clone()
        }
    }

    /// `-var name=value` argument pairs, in name order.
    #[must_use]
    pub fn var_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.vars.len() * 2);
        for (name, value) in &self.vars {
            args.push("-var".to_string());
            args.push(format!("{name}={}", value.to_hcl()));
        }
        args
    }

    /// Environment for engine commands: the invocation's variables plus
    /// [`AUTOMATION_ENV`].
    #[must_use]
    pub fn command_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !self.env.contains_key(AUTOMATION_ENV.0) {
            env.push((AUTOMATION_ENV.0.to_string(), AUTOMATION_ENV.1.to_string()));
        }
        env
    }
}

/// Collects invocation parameters; validation happens once in [`build`].
///
/// [`build`]: InvocationBuilder::build
pub struct InvocationBuilder {
    module_dir: PathBuf,
    vars: Vec<(String, VarValue)>,
    env: Vec<(String, String)>,
    var_files: Vec<PathBuf>,
    backend_config: Vec<(String, String)>,
}

impl InvocationBuilder {
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.vars.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn vars<I, K>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, VarValue)>,
        K: Into<String>,
    {
        self.vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn envs<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    #[must_use]
    pub fn backend_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_config.push((key.into(), value.into()));
        self
    }

    /// Validate and freeze the invocation.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Configuration` if the module location is empty,
    /// a variable or environment name is empty, an environment name contains
    /// `=`, a name is given twice, or a variable holds a NaN or infinite
    /// number.
    pub fn build(self) -> Result<ModuleInvocation, HarnessError> {
        if self.module_dir.as_os_str().is_empty() {
            return Err(HarnessError::Configuration(
                "module location must not be empty".to_string(),
            ));
        }

        let mut vars = BTreeMap::new();
        for (name, value) in self.vars {
            if name.trim().is_empty() {
                return Err(HarnessError::Configuration(
                    "variable names must be non-empty".to_string(),
                ));
            }
            if !value.is_finite() {
                return Err(HarnessError::Configuration(format!(
                    "variable '{name}' holds a non-finite number"
                )));
            }
            if vars.insert(name.clone(), value).is_some() {
                return Err(HarnessError::Configuration(format!(
                    "variable '{name}' given more than once"
                )));
            }
        }

        let mut env = BTreeMap::new();
        for (name, value) in self.env {
            if name.is_empty() || name.contains('=') {
                return Err(HarnessError::Configuration(format!(
                    "invalid environment variable name '{name}'"
                )));
            }
            if env.insert(name.clone(), value).is_some() {
                return Err(HarnessError::Configuration(format!(
                    "environment variable '{name}' given more than once"
                )));
            }
        }

        let mut backend_config = BTreeMap::new();
        for (key, value) in self.backend_config {
            if key.is_empty() {
                return Err(HarnessError::Configuration(
                    "backend config keys must be non-empty".to_string(),
                ));
            }
            backend_config.insert(key, value);
        }

        Ok(ModuleInvocation {
            module_dir: self.module_dir,
            vars,
            env,
            var_files: self.var_files,
            backend_config,
        })
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
