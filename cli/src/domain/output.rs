//! Module output values as read back from the engine.

use serde::Serialize;

use crate::domain::error::HarnessError;

/// A named output exposed by a module after a successful apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputValue {
    pub name: String,
    pub value: serde_json::Value,
}

impl OutputValue {
    /// Parse the `output -json NAME` document.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::OutputNotFound` when the document is empty or
    /// not valid JSON; a blank document is never turned into an empty value.
    pub fn from_json(name: &str, raw: &[u8]) -> Result<Self, HarnessError> {
        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| HarnessError::OutputNotFound {
                name: name.to_string(),
                reason: format!("engine returned unparseable output: {e}"),
            })?;
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    /// The value compared against patterns: strings as-is, everything else
    /// as compact JSON. No trimming or normalization is applied.
    #[must_use]
    pub fn as_match_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Look up `key` in a map (object) output.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::OutputNotFound` if the output is not a map or
    /// has no such key.
    pub fn entry(&self, key: &str) -> Result<OutputValue, HarnessError> {
        let map = self
            .value
            .as_object()
            .ok_or_else(|| HarnessError::OutputNotFound {
                name: format!("{}[{key}]", self.name),
                reason: "output is not a map".to_string(),
            })?;
        let value = map
            .get(key)
            .cloned()
            .ok_or_else(|| HarnessError::OutputNotFound {
                name: format!("{}[{key}]", self.name),
                reason: format!("map has no key '{key}'"),
            })?;
        Ok(OutputValue {
            name: format!("{}[{key}]", self.name),
            value,
        })
    }

    /// Element `index` of a list output.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::OutputNotFound` if the output is not a list or
    /// is too short.
    pub fn item(&self, index: usize) -> Result<OutputValue, HarnessError> {
        let name = format!("{}[{index}]", self.name);
        let items = self
            .value
            .as_array()
            .ok_or_else(|| HarnessError::OutputNotFound {
                name: name.clone(),
                reason: "output is not a list".to_string(),
            })?;
        let value = items
            .get(index)
            .cloned()
            .ok_or_else(|| HarnessError::OutputNotFound {
                name: name.clone(),
                reason: format!("list has {} item(s)", items.len()),
            })?;
        Ok(OutputValue { name, value })
    }
}
