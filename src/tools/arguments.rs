//! Typed access to tool call arguments.

use crate::error::StrideError;

use super::types::ToolParameters;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Keep only the keys the tool declares.
    ///
    /// Models routinely invent extra keyword arguments; handlers only ever
    /// see what their schema lists. Schemas without `properties` pass
    /// everything through.
    pub fn filtered(self, parameters: &ToolParameters) -> Self {
        let (Some(allowed), serde_json::Value::Object(map)) = (parameters.property_names(), &self.value) else {
            return self;
        };
        let kept = map
            .iter()
            .filter(|(key, _)| allowed.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        Self::new(serde_json::Value::Object(kept))
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, StrideError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| StrideError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an optional boolean argument.
    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.value.get(key).and_then(|v| v.as_bool())
    }

    /// Get a list of strings, accepting a single string as a one-item list.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.value.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, StrideError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| StrideError::InvalidArgument(format!("Failed to deserialize arguments: {e}")))
    }
}
