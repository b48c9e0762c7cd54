//! Consistency Enforcer: deterministic overrides on the model's decision.
//!
//! The model's stated decision is only accepted when its own evidence lists
//! agree with it. Rules run in a fixed order and each checks the *current*
//! decision:
//!
//! 1. ELIGIBLE with a met exclusion criterion → INELIGIBLE
//! 2. ELIGIBLE with an unmet inclusion criterion → INELIGIBLE
//! 3. ELIGIBLE with missing information → UNCERTAIN
//!
//! Every rule requires ELIGIBLE, so once one fires the rest cannot. That
//! gives INELIGIBLE precedence over UNCERTAIN and makes enforcement
//! idempotent. These rules are not configurable.

use crate::types::{Decision, DecisionRecord};

/// Prefix on every audit note written into `reason`.
pub const AUDIT_PREFIX: &str = "[AUTO-CORRECT]";

/// At most this many fired rules are cited in `reason`.
pub const MAX_CITED_RULES: usize = 2;

/// A single override rule.
pub trait OverrideRule: Send + Sync {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether the record's evidence contradicts an ELIGIBLE decision.
    fn contradicts_eligible(&self, record: &DecisionRecord) -> bool;

    /// Decision to force when the rule fires.
    fn downgrade_to(&self) -> Decision;

    /// Short note explaining the override to a human reviewer.
    fn audit_note(&self) -> &'static str;
}

/// A met exclusion criterion is an absolute disqualifier.
pub struct ExclusionMetRule;

impl OverrideRule for ExclusionMetRule {
    fn name(&self) -> &'static str {
        "exclusion_met"
    }

    fn contradicts_eligible(&self, record: &DecisionRecord) -> bool {
        !record.exclusion_criteria_met.is_empty()
    }

    fn downgrade_to(&self) -> Decision {
        Decision::Ineligible
    }

    fn audit_note(&self) -> &'static str {
        "Found met exclusion criteria."
    }
}

/// Failing a required inclusion criterion disqualifies.
pub struct InclusionNotMetRule;

impl OverrideRule for InclusionNotMetRule {
    fn name(&self) -> &'static str {
        "inclusion_not_met"
    }

    fn contradicts_eligible(&self, record: &DecisionRecord) -> bool {
        !record.inclusion_criteria_not_met.is_empty()
    }

    fn downgrade_to(&self) -> Decision {
        Decision::Ineligible
    }

    fn audit_note(&self) -> &'static str {
        "Found unmet inclusion criteria."
    }
}

/// Incomplete data is never reported as a positive finding.
pub struct MissingInfoRule;

impl OverrideRule for MissingInfoRule {
    fn name(&self) -> &'static str {
        "missing_info"
    }

    fn contradicts_eligible(&self, record: &DecisionRecord) -> bool {
        !record.missing_info.is_empty()
    }

    fn downgrade_to(&self) -> Decision {
        Decision::Uncertain
    }

    fn audit_note(&self) -> &'static str {
        "Missing critical info."
    }
}

/// Result of enforcement: the final record plus the rules that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enforcement {
    pub record: DecisionRecord,
    pub fired: Vec<&'static str>,
}

/// Applies the override rules in order.
pub struct ConsistencyEnforcer {
    rules: Vec<Box<dyn OverrideRule>>,
}

impl ConsistencyEnforcer {
    /// The enforcer with the standard three rules.
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(ExclusionMetRule),
                Box::new(InclusionNotMetRule),
                Box::new(MissingInfoRule),
            ],
        }
    }

    /// Rule names in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Enforce and return only the final record.
    pub fn enforce(&self, draft: DecisionRecord) -> DecisionRecord {
        self.enforce_with_audit(draft).record
    }

    /// Enforce and report which rules fired.
    pub fn enforce_with_audit(&self, draft: DecisionRecord) -> Enforcement {
        let mut record = draft;
        let mut fired = Vec::new();
        let mut notes = Vec::new();

        for rule in &self.rules {
            if record.decision == Decision::Eligible && rule.contradicts_eligible(&record) {
                tracing::debug!(
                    rule = rule.name(),
                    from = %record.decision,
                    to = %rule.downgrade_to(),
                    "Override rule fired"
                );
                record.decision = rule.downgrade_to();
                fired.push(rule.name());
                if notes.len() < MAX_CITED_RULES {
                    notes.push(format!("{} {}", AUDIT_PREFIX, rule.audit_note()));
                }
            }
        }

        if !notes.is_empty() {
            let audit = notes.join(" ");
            record.reason = if record.reason.trim().is_empty() {
                audit
            } else {
                format!("{} {}", audit, record.reason)
            };
        }

        Enforcement { record, fired }
    }
}

impl Default for ConsistencyEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

/// Enforce with the standard rule set.
pub fn enforce(draft: DecisionRecord) -> DecisionRecord {
    ConsistencyEnforcer::new().enforce(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible() -> DecisionRecord {
        DecisionRecord::new(Decision::Eligible, "All criteria satisfied.")
    }

    #[test]
    fn test_clean_eligible_unchanged() {
        let draft = eligible();
        let result = ConsistencyEnforcer::new().enforce_with_audit(draft.clone());
        assert_eq!(result.record, draft);
        assert!(result.fired.is_empty());
    }

    #[test]
    fn test_exclusion_met_forces_ineligible() {
        let mut draft = eligible();
        draft.exclusion_criteria_met = vec!["Pregnancy".into()];

        let result = ConsistencyEnforcer::new().enforce_with_audit(draft);
        assert_eq!(result.record.decision, Decision::Ineligible);
        assert_eq!(result.fired, vec!["exclusion_met"]);
        assert_eq!(
            result.record.reason,
            "[AUTO-CORRECT] Found met exclusion criteria. All criteria satisfied."
        );
    }

    #[test]
    fn test_inclusion_not_met_forces_ineligible() {
        let mut draft = eligible();
        draft.inclusion_criteria_not_met = vec!["HbA1c between 7% and 10%".into()];

        let record = enforce(draft);
        assert_eq!(record.decision, Decision::Ineligible);
        assert!(record.reason.starts_with("[AUTO-CORRECT] Found unmet inclusion criteria."));
    }

    #[test]
    fn test_missing_info_forces_uncertain() {
        let mut draft = eligible();
        draft.missing_info = vec!["eGFR".into()];

        let record = enforce(draft);
        assert_eq!(record.decision, Decision::Uncertain);
        assert!(record.reason.contains("Missing critical info."));
    }

    #[test]
    fn test_exclusion_beats_missing_info() {
        let mut draft = eligible();
        draft.exclusion_criteria_met = vec!["X".into()];
        draft.missing_info = vec!["Y".into()];

        let result = ConsistencyEnforcer::new().enforce_with_audit(draft);
        assert_eq!(result.record.decision, Decision::Ineligible);
        assert_eq!(result.fired, vec!["exclusion_met"]);
        assert!(!result.record.reason.contains("Missing critical info."));
    }

    #[test]
    fn test_only_eligible_is_downgraded() {
        for decision in [Decision::Ineligible, Decision::Uncertain, Decision::Error] {
            let mut draft = DecisionRecord::new(decision, "model reason");
            draft.exclusion_criteria_met = vec!["X".into()];
            draft.inclusion_criteria_not_met = vec!["Y".into()];
            draft.missing_info = vec!["Z".into()];

            let record = enforce(draft.clone());
            assert_eq!(record, draft);
        }
    }

    #[test]
    fn test_empty_reason_gets_audit_only() {
        let mut draft = DecisionRecord::new(Decision::Eligible, "");
        draft.missing_info = vec!["eGFR".into()];

        let record = enforce(draft);
        assert_eq!(record.reason, "[AUTO-CORRECT] Missing critical info.");
    }

    #[test]
    fn test_idempotent() {
        let mut draft = eligible();
        draft.inclusion_criteria_not_met = vec!["Age >= 18".into()];
        draft.missing_info = vec!["eGFR".into()];

        let once = enforce(draft);
        let twice = enforce(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            ConsistencyEnforcer::new().rule_names(),
            vec!["exclusion_met", "inclusion_not_met", "missing_info"]
        );
    }
}
