//! Coercing a parsed model response into a [`DecisionRecord`].
//!
//! The model is asked for a fixed JSON shape but nothing enforces it. This
//! step tolerates every field being absent or mistyped and only fails when
//! the top-level value is not an object.

use serde_json::{Map, Value as JsonValue};

use crate::types::{Decision, DecisionRecord};
use crate::ResponseError;

/// Field names as the model is instructed to write them.
pub mod fields {
    pub const DECISION: &str = "decision";
    pub const REASON: &str = "reason";
    pub const INCLUSION_MET: &str = "inclusion_criteria_met";
    pub const INCLUSION_NOT_MET: &str = "inclusion_criteria_not_met";
    pub const EXCLUSION_MET: &str = "exclusion_criteria_met";
    pub const EXCLUSION_NOT_MET: &str = "exclusion_criteria_not_met";
    pub const MISSING_INFO: &str = "missing_info";
}

/// Normalize a parsed JSON value into a draft record.
///
/// The draft has not been through the consistency rules yet; see
/// [`crate::enforcer`].
///
/// # Errors
///
/// [`ResponseError::Parse`] when `value` is not a JSON object.
pub fn normalize(value: &JsonValue) -> Result<DecisionRecord, ResponseError> {
    let object = value.as_object().ok_or_else(|| ResponseError::Parse {
        message: format!("expected a JSON object, found {}", json_type_name(value)),
    })?;

    let mut reason = coerce_reason(object.get(fields::REASON));

    let decision = match normalize_decision(object.get(fields::DECISION)) {
        Ok(decision) => decision,
        Err(label) => {
            tracing::debug!(label = %label, "Unrecognized decision, forcing ERROR");
            if reason.trim().is_empty() {
                reason = if label.is_empty() {
                    "Model response did not include a decision.".to_string()
                } else {
                    format!("Model returned an unrecognized decision: {label}")
                };
            }
            Decision::Error
        }
    };

    Ok(DecisionRecord {
        decision,
        reason,
        inclusion_criteria_met: coerce_list(object.get(fields::INCLUSION_MET)),
        inclusion_criteria_not_met: coerce_list(object.get(fields::INCLUSION_NOT_MET)),
        exclusion_criteria_met: coerce_list(object.get(fields::EXCLUSION_MET)),
        exclusion_criteria_not_met: coerce_list(object.get(fields::EXCLUSION_NOT_MET)),
        missing_info: coerce_list(object.get(fields::MISSING_INFO)),
    })
}

/// Resolve the decision field. `Err` carries the upper-cased label that
/// failed to resolve (empty when the field was missing or null).
fn normalize_decision(value: Option<&JsonValue>) -> Result<Decision, String> {
    let label = match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.trim().to_uppercase(),
        Some(other) => other.to_string().to_uppercase(),
    };

    Decision::from_label(&label).ok_or(label)
}

fn coerce_reason(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Coerce a list field into trimmed, non-empty strings.
///
/// - missing or null: empty
/// - array: each element stringified and trimmed, empties dropped
/// - anything else: a single element unless it stringifies to blank
pub fn coerce_list(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items.iter().filter_map(stringify_item).collect(),
        Some(other) => stringify_item(other).into_iter().collect(),
    }
}

/// Stringify one list element. Strings are used verbatim, nulls are
/// dropped, and everything else uses its compact JSON text.
fn stringify_item(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::Null => return None,
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Keys present in `object` that the normalizer ignores.
pub fn unknown_keys(object: &Map<String, JsonValue>) -> Vec<&str> {
    const KNOWN: [&str; 7] = [
        fields::DECISION,
        fields::REASON,
        fields::INCLUSION_MET,
        fields::INCLUSION_NOT_MET,
        fields::EXCLUSION_MET,
        fields::EXCLUSION_NOT_MET,
        fields::MISSING_INFO,
    ];
    object
        .keys()
        .map(String::as_str)
        .filter(|k| !KNOWN.contains(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_objects() {
        for value in [json!([1, 2]), json!("ELIGIBLE"), json!(42), json!(null), json!(true)] {
            let result = normalize(&value);
            assert!(matches!(result, Err(ResponseError::Parse { .. })), "{value}");
        }
    }

    #[test]
    fn test_non_object_message_names_type() {
        let err = normalize(&json!([{"decision": "ELIGIBLE"}])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_empty_object_defaults() {
        let record = normalize(&json!({})).unwrap();
        assert_eq!(record.decision, Decision::Error);
        assert_eq!(record.reason, "Model response did not include a decision.");
        assert!(record.inclusion_criteria_met.is_empty());
        assert!(record.missing_info.is_empty());
    }

    #[test]
    fn test_lowercase_decision() {
        let record = normalize(&json!({"decision": " eligible ", "reason": "ok"})).unwrap();
        assert_eq!(record.decision, Decision::Eligible);
        assert_eq!(record.reason, "ok");
    }

    #[test]
    fn test_unrecognized_decision_keeps_model_reason() {
        let record = normalize(&json!({"decision": "MAYBE", "reason": "borderline HbA1c"})).unwrap();
        assert_eq!(record.decision, Decision::Error);
        assert_eq!(record.reason, "borderline HbA1c");
    }

    #[test]
    fn test_unrecognized_decision_default_reason() {
        let record = normalize(&json!({"decision": "maybe"})).unwrap();
        assert_eq!(record.decision, Decision::Error);
        assert!(record.reason.contains("MAYBE"));
    }

    #[test]
    fn test_non_string_decision() {
        let record = normalize(&json!({"decision": 1})).unwrap();
        assert_eq!(record.decision, Decision::Error);
        assert!(record.reason.contains('1'));
    }

    #[test]
    fn test_reason_coerced_to_string() {
        let record = normalize(&json!({"decision": "UNCERTAIN", "reason": {"step": 1}})).unwrap();
        assert_eq!(record.reason, r#"{"step":1}"#);

        let record = normalize(&json!({"decision": "UNCERTAIN", "reason": 7})).unwrap();
        assert_eq!(record.reason, "7");
    }

    #[test]
    fn test_list_from_array() {
        let list = coerce_list(Some(&json!(["  Age >= 18 ", "", "   ", "HbA1c 7-10%", 5, true, null])));
        assert_eq!(list, vec!["Age >= 18", "HbA1c 7-10%", "5", "true"]);
    }

    #[test]
    fn test_list_preserves_duplicates_and_order() {
        let list = coerce_list(Some(&json!(["b", "a", "b"])));
        assert_eq!(list, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_list_from_scalar() {
        assert_eq!(coerce_list(Some(&json!("eGFR"))), vec!["eGFR"]);
        assert_eq!(coerce_list(Some(&json!("   "))), Vec::<String>::new());
        assert_eq!(coerce_list(Some(&json!(3.5))), vec!["3.5"]);
        assert_eq!(coerce_list(Some(&json!(false))), vec!["false"]);
    }

    #[test]
    fn test_list_from_object() {
        assert_eq!(coerce_list(Some(&json!({"lab": "eGFR"}))), vec![r#"{"lab":"eGFR"}"#]);
    }

    #[test]
    fn test_list_null_or_missing() {
        assert!(coerce_list(None).is_empty());
        assert!(coerce_list(Some(&JsonValue::Null)).is_empty());
    }

    #[test]
    fn test_nested_arrays_stringified() {
        let list = coerce_list(Some(&json!([["a", "b"]])));
        assert_eq!(list, vec![r#"["a","b"]"#]);
    }

    #[test]
    fn test_unknown_keys() {
        let value = json!({"decision": "ELIGIBLE", "confidence": 0.9, "notes": "x"});
        let mut keys = unknown_keys(value.as_object().unwrap());
        keys.sort();
        assert_eq!(keys, vec!["confidence", "notes"]);
    }
}
