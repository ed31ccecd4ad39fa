use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Error marker stored in place of a parsed extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionError {
    pub error: String,
    #[serde(rename = "rawResponse")]
    pub raw_response: Option<String>,
}

/// Outcome of one (file, model) extraction: the model's JSON, or an error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionResult {
    Failed(ExtractionError),
    Parsed(Value),
}

impl ExtractionResult {
    pub fn failed(error: impl Into<String>, raw_response: Option<String>) -> Self {
        ExtractionResult::Failed(ExtractionError {
            error: error.into(),
            raw_response,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExtractionResult::Failed(_))
    }

    pub fn parsed(&self) -> Option<&Value> {
        match self {
            ExtractionResult::Parsed(v) => Some(v),
            ExtractionResult::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExtractionError> {
        match self {
            ExtractionResult::Failed(e) => Some(e),
            ExtractionResult::Parsed(_) => None,
        }
    }
}

/// file name -> model name -> extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsTable {
    files: BTreeMap<String, BTreeMap<String, ExtractionResult>>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, file: &str, model: &str, result: ExtractionResult) {
        self.files
            .entry(file.to_string())
            .or_default()
            .insert(model.to_string(), result);
    }

    /// Registers a file with no results yet so it still shows up in the output.
    pub fn ensure_file(&mut self, file: &str) {
        self.files.entry(file.to_string()).or_default();
    }

    pub fn get(&self, file: &str, model: &str) -> Option<&ExtractionResult> {
        self.files.get(file).and_then(|m| m.get(model))
    }

    pub fn files(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, ExtractionResult>)> {
        self.files.iter()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every model name that appears anywhere in the table, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .values()
            .flat_map(|m| m.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_record_serializes_with_null_raw_response() {
        let r = ExtractionResult::failed("connection refused", None);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, json!({"error": "connection refused", "rawResponse": null}));
    }

    #[test]
    fn parsed_object_serializes_transparently() {
        let r = ExtractionResult::Parsed(json!({"invoiceDetails": {"invoiceNumber": "7"}}));
        let text = serde_json::to_string(&r).unwrap();
        assert_eq!(text, r#"{"invoiceDetails":{"invoiceNumber":"7"}}"#);
    }

    #[test]
    fn deserializes_both_shapes() {
        let table: ResultsTable = serde_json::from_value(json!({
            "a.pdf": {
                "m1": {"error": "boom", "rawResponse": "not json"},
                "m2": {"invoiceNumber": "X"}
            }
        }))
        .unwrap();
        assert!(table.get("a.pdf", "m1").unwrap().is_error());
        assert_eq!(
            table.get("a.pdf", "m2").unwrap().parsed(),
            Some(&json!({"invoiceNumber": "X"}))
        );
        assert_eq!(table.model_names(), vec!["m1".to_string(), "m2".to_string()]);
    }

    #[test]
    fn object_with_extra_fields_beside_error_stays_parsed() {
        let r: ExtractionResult =
            serde_json::from_value(json!({"error": "x", "invoiceNumber": "1"})).unwrap();
        assert!(!r.is_error());
    }
}
