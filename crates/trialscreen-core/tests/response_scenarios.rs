//! End-to-end validation of realistic model responses.

use trialscreen_core::{parse_response, validate_response, Decision, DecisionRecord, ResponseError};

const VERBOSE_ELIGIBLE: &str = r#"Here is my step-by-step assessment of the patient.

STEP 1: Age is 55, trial requires 18-75. Met.
STEP 2: HbA1c is 7.5%, trial requires 7.0-10.5%. Met.

```json
{
  "decision": "ELIGIBLE",
  "reason": "STEP 1: Age 55 within 18-75. STEP 2: HbA1c 7.5% within 7.0-10.5%. CONCLUSION: eligible.",
  "inclusion_criteria_met": ["Age 18-75", "HbA1c 7.0-10.5%", "Type 2 diabetes diagnosis"],
  "inclusion_criteria_not_met": [],
  "exclusion_criteria_met": [],
  "exclusion_criteria_not_met": ["Pregnancy", "Type 1 diabetes"],
  "missing_info": []
}
```

Please let me know if you need anything else."#;

#[test]
fn test_lowercase_eligible_with_empty_lists_stays_eligible() {
    let raw = r#"{"decision":"eligible","reason":"ok","inclusion_criteria_not_met":[],"exclusion_criteria_met":[],"missing_info":[]}"#;
    let record = validate_response(raw);
    assert_eq!(record.decision, Decision::Eligible);
    assert_eq!(record.reason, "ok");
}

#[test]
fn test_no_braces_reports_raw_snippet() {
    let raw = "Sorry, I can't help with that request.";
    let record = validate_response(raw);
    assert_eq!(record.decision, Decision::Error);
    assert!(record.reason.contains("Sorry, I can't help"));
}

#[test]
fn test_missing_info_only_becomes_uncertain() {
    let raw = r#"{"decision":"ELIGIBLE","missing_info":["eGFR"]}"#;
    let record = validate_response(raw);

    assert_eq!(record.decision, Decision::Uncertain);
    assert_eq!(record.missing_info, vec!["eGFR"]);
    assert!(record.inclusion_criteria_met.is_empty());
    assert!(record.exclusion_criteria_not_met.is_empty());
    assert!(record.reason.contains("[AUTO-CORRECT]"));
}

#[test]
fn test_maybe_is_error() {
    let record = validate_response(r#"{"decision":"MAYBE","reason":"borderline"}"#);
    assert_eq!(record.decision, Decision::Error);
}

#[test]
fn test_exclusion_and_missing_info_is_ineligible() {
    let raw = r#"{"decision":"ELIGIBLE","exclusion_criteria_met":["X"],"missing_info":["Y"]}"#;
    let record = validate_response(raw);
    assert_eq!(record.decision, Decision::Ineligible);
    assert!(record.reason.contains("exclusion"));
}

#[test]
fn test_verbose_fenced_response() {
    let record = validate_response(VERBOSE_ELIGIBLE);
    assert_eq!(record.decision, Decision::Eligible);
    assert_eq!(record.inclusion_criteria_met.len(), 3);
    assert_eq!(record.exclusion_criteria_not_met, vec!["Pregnancy", "Type 1 diabetes"]);
    assert!(record.reason.starts_with("STEP 1"));
}

#[test]
fn test_unfenced_with_trailing_braces_in_prose() {
    let raw = r#"Decision follows. {"decision": "INELIGIBLE", "reason": "Age 16 < 18",
        "inclusion_criteria_not_met": ["Age >= 18"]} Note: see {appendix} for criteria."#;
    let record = validate_response(raw);
    assert_eq!(record.decision, Decision::Ineligible);
    assert_eq!(record.inclusion_criteria_not_met, vec!["Age >= 18"]);
}

#[test]
fn test_quoted_criteria_fence_before_unfenced_answer() {
    let raw = "Criteria quoted:\n```text\nAge >= 18\n```\n{\"decision\": \"INELIGIBLE\", \"reason\": \"age\"}";
    let record = parse_response(raw).unwrap();
    assert_eq!(record.decision, Decision::Ineligible);
    assert_eq!(record.reason, "age");
}

#[test]
fn test_unbalanced_brace_inside_string_is_parse_error() {
    // Known limitation of the brace scan: an unmatched `}` inside a string
    // literal closes the candidate early.
    let raw = r#"{"reason": "value :} odd", "decision": "ELIGIBLE"}"#;
    let err = parse_response(raw).unwrap_err();
    assert!(matches!(err, ResponseError::Parse { .. }));
    assert_eq!(validate_response(raw).decision, Decision::Error);
}

#[test]
fn test_scalar_list_fields_are_wrapped() {
    let raw = r#"{"decision":"INELIGIBLE","reason":"x","exclusion_criteria_met":"Pregnant","missing_info":""}"#;
    let record = validate_response(raw);
    assert_eq!(record.exclusion_criteria_met, vec!["Pregnant"]);
    assert!(record.missing_info.is_empty());
}

#[test]
fn test_eligible_invariant_holds_after_validation() {
    let responses = [
        r#"{"decision":"ELIGIBLE","inclusion_criteria_not_met":["A"]}"#,
        r#"{"decision":"ELIGIBLE","exclusion_criteria_met":["B"]}"#,
        r#"{"decision":"ELIGIBLE","missing_info":["C"]}"#,
        r#"{"decision":"ELIGIBLE","inclusion_criteria_not_met":["A"],"exclusion_criteria_met":["B"],"missing_info":["C"]}"#,
    ];

    for raw in responses {
        let record = validate_response(raw);
        assert_ne!(record.decision, Decision::Eligible, "{raw}");
    }
}

#[test]
fn test_revalidating_record_json_is_stable() {
    let record = validate_response(VERBOSE_ELIGIBLE);
    let again = validate_response(&record.to_json().to_string());
    assert_eq!(record, again);

    let downgraded = validate_response(r#"{"decision":"ELIGIBLE","missing_info":["eGFR"]}"#);
    let again = validate_response(&downgraded.to_json().to_string());
    assert_eq!(downgraded, again);
}

#[test]
fn test_error_record_shape() {
    let record = DecisionRecord::error("Model init failed");
    assert_eq!(record.decision, Decision::Error);
    assert!(record.missing_info.is_empty());
    assert_eq!(record.reason, "Model init failed");
}
