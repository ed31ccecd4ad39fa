//! Field-by-field scoring of candidate extractions against the truth model.
//!
//! Totals are always taken over the truth output's leaf fields that are not
//! excluded by the active profile. A candidate that lacks a nested object the
//! truth has gets every leaf beneath it counted as missing.

use crate::normalize::{is_blank, normalize, value_text, values_match, Strictness};
use crate::profiles::{ExtractionProfile, ProfileKind};
use crate::types::{ExtractionResult, ResultsTable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const NOTE_TRUTH_ERROR: &str = "truth model failed for this file";
pub const NOTE_TRUTH_MISSING: &str = "no truth model result recorded";
pub const NOTE_TRUTH_NOT_OBJECT: &str = "truth model output is not a JSON object";
pub const NOTE_NO_SCORABLE_FIELDS: &str = "truth model produced no scorable fields";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDifference {
    pub field: String,
    pub model_value: Value,
    pub truth_value: Value,
    pub normalized_model: String,
    pub normalized_truth: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldComparison {
    pub total_fields: usize,
    pub matching_fields: usize,
    pub missing_fields: Vec<String>,
    pub differing_fields: Vec<FieldDifference>,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ModelOutcome {
    Compared(FieldComparison),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileComparison {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    pub models: BTreeMap<String, ModelOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub model: String,
    /// Mean accuracy over compared files; `None` when nothing could be compared.
    pub average_accuracy: Option<f64>,
    pub files_compared: usize,
    pub error_count: usize,
    pub total_fields: usize,
    pub matching_fields: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruthSummary {
    pub model: String,
    pub success_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub file: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub truth: TruthSummary,
    pub models: Vec<ModelSummary>,
    pub skipped_files: Vec<SkippedFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub truth_model: String,
    pub profile: ProfileKind,
    pub strictness: Strictness,
    pub excluded_paths: Vec<String>,
    pub files: BTreeMap<String, FileComparison>,
    pub summary: ComparisonSummary,
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

struct Walker<'a> {
    profile: &'a ExtractionProfile,
    out: FieldComparison,
}

impl Walker<'_> {
    fn walk(&mut self, truth: &Map<String, Value>, candidate: Option<&Map<String, Value>>, prefix: &str) {
        for (key, truth_value) in truth {
            let path = join_path(prefix, key);
            if self.profile.is_excluded(&path) {
                continue;
            }
            let model_value = candidate.and_then(|c| c.get(key));
            match truth_value {
                Value::Object(nested) => {
                    let nested_candidate = match model_value {
                        Some(Value::Object(m)) => Some(m),
                        _ => None,
                    };
                    self.walk(nested, nested_candidate, &path);
                }
                _ if candidate.is_none() => self.missing(path),
                _ => self.leaf(path, truth_value, model_value),
            }
        }
    }

    fn missing(&mut self, path: String) {
        self.out.total_fields += 1;
        self.out.missing_fields.push(path);
    }

    fn leaf(&mut self, path: String, truth_value: &Value, model_value: Option<&Value>) {
        let strictness = self.profile.strictness;
        let model_or_null = model_value.unwrap_or(&Value::Null);
        self.out.total_fields += 1;
        if values_match(truth_value, model_or_null, strictness) {
            self.out.matching_fields += 1;
        } else if is_blank(model_value) {
            self.out.missing_fields.push(path);
        } else {
            self.out.differing_fields.push(FieldDifference {
                field: path,
                model_value: model_or_null.clone(),
                truth_value: truth_value.clone(),
                normalized_model: normalize(&value_text(model_or_null), strictness),
                normalized_truth: normalize(&value_text(truth_value), strictness),
            });
        }
    }
}

/// Counts the truth leaves that will be scored under `profile`.
pub fn count_scorable_fields(truth: &Map<String, Value>, profile: &ExtractionProfile) -> usize {
    fn count(map: &Map<String, Value>, prefix: &str, profile: &ExtractionProfile) -> usize {
        map.iter()
            .map(|(key, value)| {
                let path = join_path(prefix, key);
                if profile.is_excluded(&path) {
                    0
                } else if let Value::Object(nested) = value {
                    count(nested, &path, profile)
                } else {
                    1
                }
            })
            .sum()
    }
    count(truth, "", profile)
}

/// Diffs one candidate output against the truth output.
pub fn compare_fields(truth: &Map<String, Value>, candidate: &Value, profile: &ExtractionProfile) -> FieldComparison {
    let mut walker = Walker {
        profile,
        out: FieldComparison::default(),
    };
    match candidate {
        Value::Object(c) => walker.walk(truth, Some(c), ""),
        _ => walker.walk(truth, None, ""),
    }
    let mut out = walker.out;
    out.accuracy = if out.total_fields == 0 {
        0.0
    } else {
        out.matching_fields as f64 / out.total_fields as f64 * 100.0
    };
    out
}

/// Scores every non-truth model in `models` against `truth_model` across the table.
pub fn compare_results(
    table: &ResultsTable,
    truth_model: &str,
    models: &[String],
    profile: &ExtractionProfile,
) -> ComparisonReport {
    let candidates: Vec<&String> = models.iter().filter(|m| m.as_str() != truth_model).collect();
    let mut files = BTreeMap::new();
    let mut skipped_files = Vec::new();
    let mut truth = TruthSummary {
        model: truth_model.to_string(),
        success_count: 0,
        error_count: 0,
    };
    let mut accuracies: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut errors: BTreeMap<&str, usize> = BTreeMap::new();
    let mut field_totals: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

    for (file, by_model) in table.files() {
        for model in &candidates {
            if by_model.get(model.as_str()).map_or(true, ExtractionResult::is_error) {
                *errors.entry(model.as_str()).or_default() += 1;
            }
        }

        let truth_output = match by_model.get(truth_model) {
            Some(ExtractionResult::Parsed(v)) => {
                truth.success_count += 1;
                Ok(v)
            }
            Some(ExtractionResult::Failed(_)) => {
                truth.error_count += 1;
                Err(NOTE_TRUTH_ERROR)
            }
            None => {
                truth.error_count += 1;
                Err(NOTE_TRUTH_MISSING)
            }
        };
        let truth_map = truth_output.and_then(|v| match v {
            Value::Object(m) if count_scorable_fields(m, profile) > 0 => Ok(m),
            Value::Object(_) => Err(NOTE_NO_SCORABLE_FIELDS),
            _ => Err(NOTE_TRUTH_NOT_OBJECT),
        });
        let truth_map = match truth_map {
            Ok(m) => m,
            Err(note) => {
                tracing::warn!("Skipping {} from scoring: {}", file, note);
                skipped_files.push(SkippedFile {
                    file: file.clone(),
                    note: note.to_string(),
                });
                files.insert(
                    file.clone(),
                    FileComparison {
                        skipped: Some(note.to_string()),
                        models: BTreeMap::new(),
                    },
                );
                continue;
            }
        };

        let mut entry = FileComparison::default();
        for model in &candidates {
            let outcome = match by_model.get(model.as_str()) {
                Some(ExtractionResult::Parsed(candidate)) => {
                    let cmp = compare_fields(truth_map, candidate, profile);
                    accuracies.entry(model.as_str()).or_default().push(cmp.accuracy);
                    let totals = field_totals.entry(model.as_str()).or_default();
                    totals.0 += cmp.total_fields;
                    totals.1 += cmp.matching_fields;
                    ModelOutcome::Compared(cmp)
                }
                Some(ExtractionResult::Failed(e)) => ModelOutcome::Failed { error: e.error.clone() },
                None => ModelOutcome::Failed {
                    error: "no result recorded".to_string(),
                },
            };
            entry.models.insert((*model).clone(), outcome);
        }
        files.insert(file.clone(), entry);
    }

    let models_summary = candidates
        .iter()
        .map(|model| {
            let accs = accuracies.get(model.as_str());
            let (total_fields, matching_fields) = field_totals.get(model.as_str()).copied().unwrap_or_default();
            ModelSummary {
                model: (*model).clone(),
                average_accuracy: accs
                    .filter(|a| !a.is_empty())
                    .map(|a| a.iter().sum::<f64>() / a.len() as f64),
                files_compared: accs.map_or(0, Vec::len),
                error_count: errors.get(model.as_str()).copied().unwrap_or(0),
                total_fields,
                matching_fields,
            }
        })
        .collect();

    ComparisonReport {
        truth_model: truth_model.to_string(),
        profile: profile.kind,
        strictness: profile.strictness,
        excluded_paths: profile.excluded_paths.clone(),
        files,
        summary: ComparisonSummary {
            truth,
            models: models_summary,
            skipped_files,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn basic_profile(excluded: &[&str]) -> ExtractionProfile {
        ExtractionProfile::builtin(ProfileKind::Transporter)
            .with_strictness(Some(Strictness::Basic))
            .with_exclusions(excluded.iter().copied())
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn assert_counts_consistent(c: &FieldComparison) {
        assert_eq!(
            c.matching_fields + c.missing_fields.len() + c.differing_fields.len(),
            c.total_fields
        );
    }

    #[test]
    fn case_difference_still_matches() {
        let truth = obj(json!({"invoiceNumber": "INV-001"}));
        let c = compare_fields(&truth, &json!({"invoiceNumber": "inv-001"}), &basic_profile(&[]));
        assert_eq!(c.total_fields, 1);
        assert_eq!(c.matching_fields, 1);
        assert_eq!(c.accuracy, 100.0);
    }

    #[test]
    fn absent_nested_object_marks_subtree_missing() {
        let truth = obj(json!({"vendorDetails": {"vendorName": "Acme"}}));
        let c = compare_fields(&truth, &json!({}), &basic_profile(&[]));
        assert_eq!(c.total_fields, 1);
        assert_eq!(c.missing_fields, vec!["vendorDetails.vendorName".to_string()]);
        assert_eq!(c.accuracy, 0.0);
    }

    #[test]
    fn blank_truth_leaf_needs_an_equal_candidate_value() {
        let profile = basic_profile(&[]);
        let c = compare_fields(&obj(json!({"poNumber": ""})), &json!({}), &profile);
        assert_eq!(c.matching_fields, 0);
        assert_eq!(c.missing_fields, vec!["poNumber".to_string()]);
        assert_eq!(c.accuracy, 0.0);

        let c = compare_fields(&obj(json!({"poNumber": null})), &json!({"poNumber": ""}), &profile);
        assert_eq!(c.missing_fields, vec!["poNumber".to_string()]);

        let c = compare_fields(&obj(json!({"poNumber": ""})), &json!({"poNumber": "  "}), &profile);
        assert_eq!(c.matching_fields, 1);
        let c = compare_fields(&obj(json!({"poNumber": null})), &json!({"poNumber": null}), &profile);
        assert_eq!(c.matching_fields, 1);
    }

    #[test]
    fn absent_key_scores_like_absent_parent() {
        let profile = basic_profile(&[]);
        let truth = obj(json!({"inv": {"poNumber": ""}}));
        let no_parent = compare_fields(&truth, &json!({}), &profile);
        let no_key = compare_fields(&truth, &json!({"inv": {}}), &profile);
        assert_eq!(no_parent.missing_fields, vec!["inv.poNumber".to_string()]);
        assert_eq!(no_key.missing_fields, no_parent.missing_fields);
        assert_eq!(no_key.matching_fields, 0);
    }

    #[test]
    fn nested_object_replaced_by_string_is_missing() {
        let truth = obj(json!({"vendorDetails": {"vendorName": "Acme", "gst": "27AA"}}));
        let c = compare_fields(&truth, &json!({"vendorDetails": "Acme"}), &basic_profile(&[]));
        assert_eq!(c.missing_fields.len(), 2);
        assert_counts_consistent(&c);
    }

    #[test]
    fn excluded_path_never_counted() {
        let truth = obj(json!({"vendorDetails": {"vendorName": "Acme", "address": "1 Main St"}}));
        let c = compare_fields(
            &truth,
            &json!({"vendorDetails": {"vendorName": "Acme"}}),
            &basic_profile(&["vendorDetails.address"]),
        );
        assert_eq!(c.total_fields, 1);
        assert!(c.missing_fields.is_empty());
        assert_eq!(c.accuracy, 100.0);
    }

    #[test]
    fn classifies_match_missing_and_differing() {
        let truth = obj(json!({
            "invoiceDetails": {
                "invoiceNumber": "INV 7",
                "invoiceDate": "2024-01-02",
                "totalAmount": "1500",
                "poNumber": ""
            }
        }));
        let candidate = json!({
            "invoiceDetails": {
                "invoiceNumber": "inv  7",
                "invoiceDate": "",
                "totalAmount": "1,500",
                "extra": "ignored"
            }
        });
        let c = compare_fields(&truth, &candidate, &basic_profile(&[]));
        assert_eq!(c.total_fields, 4);
        assert_eq!(c.matching_fields, 1);
        assert_eq!(
            c.missing_fields,
            vec!["invoiceDetails.invoiceDate".to_string(), "invoiceDetails.poNumber".to_string()]
        );
        assert_eq!(c.differing_fields.len(), 1);
        let d = &c.differing_fields[0];
        assert_eq!(d.field, "invoiceDetails.totalAmount");
        assert_eq!(d.model_value, json!("1,500"));
        assert_eq!(d.normalized_truth, "1500");
        assert_eq!(c.accuracy, 25.0);
        assert_counts_consistent(&c);
    }

    #[test]
    fn strict_profile_absorbs_punctuation_and_homoglyphs() {
        let profile = ExtractionProfile::builtin(ProfileKind::Supplier);
        let truth = obj(json!({"transportDetails": {"vehicleNumber": "MH 12 AB 1234"}}));
        let c = compare_fields(
            &truth,
            &json!({"transportDetails": {"vehicleNumber": "ΜΗ-12-ΑΒ-1234"}}),
            &profile,
        );
        assert_eq!(c.matching_fields, 1);
    }

    fn table(entries: Value) -> ResultsTable {
        serde_json::from_value(entries).unwrap()
    }

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn errored_truth_skips_file_for_everyone() {
        let t = table(json!({
            "a.pdf": {
                "truth": {"error": "quota", "rawResponse": null},
                "m1": {"invoiceNumber": "1"}
            },
            "b.pdf": {
                "truth": {"invoiceNumber": "2"},
                "m1": {"invoiceNumber": "2"}
            }
        }));
        let r = compare_results(&t, "truth", &models(&["truth", "m1"]), &basic_profile(&[]));
        assert_eq!(r.files["a.pdf"].skipped.as_deref(), Some(NOTE_TRUTH_ERROR));
        assert!(r.files["a.pdf"].models.is_empty());
        let m1 = &r.summary.models[0];
        assert_eq!(m1.files_compared, 1);
        assert_eq!(m1.average_accuracy, Some(100.0));
        assert_eq!(r.summary.truth.error_count, 1);
        assert_eq!(r.summary.truth.success_count, 1);
        assert_eq!(r.summary.skipped_files.len(), 1);
    }

    #[test]
    fn candidate_failure_counts_error_not_zero_accuracy() {
        let t = table(json!({
            "a.pdf": {
                "truth": {"invoiceNumber": "1"},
                "m1": {"error": "connection reset", "rawResponse": null}
            },
            "b.pdf": {
                "truth": {"invoiceNumber": "2", "date": "x"},
                "m1": {"invoiceNumber": "2", "date": "y"}
            }
        }));
        let r = compare_results(&t, "truth", &models(&["truth", "m1"]), &basic_profile(&[]));
        let m1 = &r.summary.models[0];
        assert_eq!(m1.error_count, 1);
        assert_eq!(m1.files_compared, 1);
        assert_eq!(m1.average_accuracy, Some(50.0));
        assert_eq!(
            r.files["a.pdf"].models["m1"],
            ModelOutcome::Failed {
                error: "connection reset".to_string()
            }
        );
    }

    #[test]
    fn averages_across_files() {
        let t = table(json!({
            "a.pdf": {"truth": {"x": "1", "y": "2"}, "m1": {"x": "1", "y": "2"}},
            "b.pdf": {"truth": {"x": "1", "y": "2"}, "m1": {"x": "1"}}
        }));
        let r = compare_results(&t, "truth", &models(&["truth", "m1"]), &basic_profile(&[]));
        let m1 = &r.summary.models[0];
        assert_eq!(m1.average_accuracy, Some(75.0));
        assert_eq!(m1.total_fields, 4);
        assert_eq!(m1.matching_fields, 3);
    }

    #[test]
    fn truth_with_only_excluded_fields_is_skipped() {
        let t = table(json!({
            "a.pdf": {"truth": {"addressDetails": {"billingAddress": {"billToName": "X"}}}, "m1": {}}
        }));
        let r = compare_results(&t, "truth", &models(&["truth", "m1"]), &basic_profile(&["addressDetails"]));
        assert_eq!(r.files["a.pdf"].skipped.as_deref(), Some(NOTE_NO_SCORABLE_FIELDS));
        assert_eq!(r.summary.models[0].average_accuracy, None);
    }

    #[test]
    fn missing_candidate_entry_counts_as_error() {
        let t = table(json!({"a.pdf": {"truth": {"x": "1"}}}));
        let r = compare_results(&t, "truth", &models(&["truth", "m1"]), &basic_profile(&[]));
        assert_eq!(r.summary.models[0].error_count, 1);
        assert_eq!(r.summary.models[0].files_compared, 0);
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let t = table(json!({"a.pdf": {"truth": {"x": "1"}, "m1": {"x": "1"}}}));
        let r = compare_results(&t, "truth", &models(&["truth", "m1"]), &basic_profile(&[]));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["files"]["a.pdf"]["models"]["m1"]["status"], json!("compared"));
        assert_eq!(v["files"]["a.pdf"]["models"]["m1"]["matchingFields"], json!(1));
        assert_eq!(v["summary"]["models"][0]["averageAccuracy"], json!(100.0));
    }
}
