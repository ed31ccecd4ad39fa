use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How aggressively strings are folded before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Lowercase and collapse whitespace.
    Basic,
    /// Basic, plus Greek homoglyphs folded to Latin and all non-alphanumerics removed.
    Strict,
}

/// Greek letters (after lowercasing) that render like a Latin capital.
/// Keyed on the lowercase form so the mapping is stable under repeated normalization.
fn latin_lookalike(c: char) -> Option<char> {
    let mapped = match c {
        'α' => 'a',
        'β' => 'b',
        'ε' => 'e',
        'ζ' => 'z',
        'η' => 'h',
        'ι' => 'i',
        'κ' => 'k',
        'μ' => 'm',
        'ν' => 'n',
        'ο' => 'o',
        'ρ' => 'p',
        'τ' => 't',
        'υ' => 'y',
        'χ' => 'x',
        _ => return None,
    };
    Some(mapped)
}

pub fn normalize(s: &str, strictness: Strictness) -> String {
    let lower = s.to_lowercase();
    match strictness {
        Strictness::Basic => lower.split_whitespace().collect::<Vec<_>>().join(" "),
        Strictness::Strict => lower
            .chars()
            .map(|c| latin_lookalike(c).unwrap_or(c))
            .filter(|c| c.is_alphanumeric())
            .collect(),
    }
}

/// Textual form of a JSON leaf for comparison and diagnostics.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// True for null, absent, or whitespace-only strings.
pub fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Null equals only null. If either side is a string, compare normalized text.
/// Lists and objects compare element-wise with the same rule.
pub fn values_match(a: &Value, b: &Value, strictness: Strictness) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(_), _) | (_, Value::String(_)) => {
            normalize(&value_text(a), strictness) == normalize(&value_text(b), strictness)
        }
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|(x, y)| values_match(x, y, strictness))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_match(x, y, strictness)))
        }
        _ => a == b,
    }
}
