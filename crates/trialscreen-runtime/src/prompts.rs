//! Screening prompt.
//!
//! One user message per (patient, trial) pair:
//! 1. Role and task framing
//! 2. Trial criteria, verbatim
//! 3. Patient record as indented JSON
//! 4. Reasoning instructions and the exact JSON output shape
//!
//! The output section names all seven fields the normalizer reads.

use trialscreen_core::PatientRecord;

/// Role and task framing.
pub const SCREENING_PREAMBLE: &str = r#"You are an expert Clinical Research Associate.
Your task is to determine if a patient is ELIGIBLE, INELIGIBLE, or UNCERTAIN for a clinical trial."#;

/// Step-by-step reasoning instructions.
pub const SCREENING_INSTRUCTIONS: &str = r#"## INSTRUCTIONS
1. Analyze the patient data against every single inclusion and exclusion criterion.
2. **CRITICAL:** Provide a VERY DETAILED, STEP-BY-STEP reasoning in the 'reason' field.
   - Quote specific patient values (e.g. "Patient age is 45").
   - Quote specific trial limits (e.g. "Trial requires age > 50").
   - Explain exactly why the match failed or succeeded.
   - Do NOT be concise. Be verbose and clinical.
3. If a criterion cannot be checked because the patient data lacks the value, list it in 'missing_info'.
4. Output your final decision in strict JSON format."#;

/// The JSON shape the model must answer with.
pub const SCREENING_OUTPUT_FORMAT: &str = r#"## JSON OUTPUT FORMAT
{
  "decision": "ELIGIBLE" | "INELIGIBLE" | "UNCERTAIN",
  "reason": "STEP 1: Checking Age... [analysis]. STEP 2: Checking HbA1c... [analysis]. CONCLUSION: [summary]",
  "inclusion_criteria_met": ["list of strings"],
  "inclusion_criteria_not_met": ["list of strings"],
  "exclusion_criteria_met": ["list of strings (bad)"],
  "exclusion_criteria_not_met": ["list of strings (good)"],
  "missing_info": ["list of strings"]
}"#;

/// Build the screening prompt for one patient against one trial.
///
/// `trial_text` is embedded verbatim. Fails only if the patient record
/// cannot be serialized.
pub fn build_screening_prompt(
    trial_text: &str,
    patient: &PatientRecord,
) -> Result<String, serde_json::Error> {
    let patient_json = patient.to_pretty_json()?;

    let mut prompt = String::with_capacity(
        SCREENING_PREAMBLE.len()
            + trial_text.len()
            + patient_json.len()
            + SCREENING_INSTRUCTIONS.len()
            + SCREENING_OUTPUT_FORMAT.len()
            + 64,
    );
    prompt.push_str(SCREENING_PREAMBLE);
    prompt.push_str("\n\n## TRIAL CRITERIA\n");
    prompt.push_str(trial_text);
    prompt.push_str("\n\n## PATIENT DATA\n");
    prompt.push_str(&patient_json);
    prompt.push_str("\n\n");
    prompt.push_str(SCREENING_INSTRUCTIONS);
    prompt.push_str("\n\n");
    prompt.push_str(SCREENING_OUTPUT_FORMAT);
    prompt.push('\n');
    Ok(prompt)
}
