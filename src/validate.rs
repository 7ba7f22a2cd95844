use serde_json::Value;

use crate::error::{PipelineError, Result};

/// A syntactically valid extraction response.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    value: Value,
    canonical: String,
}

impl ExtractionResult {
    /// Compact re-serialization written to the result store.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn emails(&self) -> Vec<String> {
        string_list(&self.value, "emails")
    }

    pub fn contact_links(&self) -> Vec<String> {
        string_list(&self.value, "contact_links")
    }
}

/// Strict parse: the whole response must be JSON. No fence or prose stripping.
pub fn validate(document: &str, raw: &str) -> Result<ExtractionResult> {
    let value: Value = serde_json::from_str(raw).map_err(|e| PipelineError::Validation {
        document: document.to_string(),
        message: e.to_string(),
    })?;
    let canonical = serde_json::to_string(&value).map_err(|e| PipelineError::Validation {
        document: document.to_string(),
        message: e.to_string(),
    })?;
    Ok(ExtractionResult { value, canonical })
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
