//! Declared start parameters of the trigger container.

use serde::{Deserialize, Serialize};

/// A start parameter declared on the trigger container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildFormProperty {
    /// Parameter id, used as the key in the start parameter map.
    pub id: String,
    /// Declared default value.
    #[serde(default)]
    pub default_value: serde_json::Value,
    /// Whether the caller must supply a value.
    #[serde(default)]
    pub required: bool,
    /// Optional description shown on the start form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl BuildFormProperty {
    /// Creates an optional parameter with a default.
    #[must_use]
    pub fn new(id: impl Into<String>, default_value: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            default_value,
            required: false,
            desc: None,
        }
    }

    /// Marks the parameter as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Returns true if the declared default is a boolean.
    #[must_use]
    pub fn is_boolean(&self) -> bool {
        self.default_value.is_boolean()
    }
}
