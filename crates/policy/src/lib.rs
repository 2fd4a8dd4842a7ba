// SPDX-License-Identifier: MIT

//! Policy Evaluator (C3, §4.7).
//!
//! Loads a policy document (YAML on disk; a parsed struct in memory) and
//! evaluates license, clarity, and scorecard alerts against the precedence
//! order `error > warning > missing > ''`.

use regex::Regex;
use scaorch_core::SystemError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Alert severity, ordered so `Ord`/`max` implement the precedence rule in
/// §4.7: `error > warning > missing > ''`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Alert {
    #[serde(rename = "")]
    Empty,
    #[serde(rename = "missing")]
    Missing,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "error")]
    Error,
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Alert::Empty => "",
            Alert::Missing => "missing",
            Alert::Warning => "warning",
            Alert::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A single license key's policy entry (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensePolicy {
    pub label: String,
    pub alert: Alert,
}

/// A score threshold paired with the alert it triggers (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threshold<T> {
    pub threshold: T,
    pub alert: Alert,
}

/// The policy document loaded at startup (§4.7).
///
/// `clarity_thresholds` and `scorecard_thresholds` must be sorted strictly
/// descending by `threshold` in the source document; [`PolicyDocument::from_yaml`]
/// validates this at load time and returns `InvalidPolicy` otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub license_policies: BTreeMap<String, LicensePolicy>,
    #[serde(default)]
    pub clarity_thresholds: Vec<Threshold<i64>>,
    #[serde(default)]
    pub scorecard_thresholds: Vec<Threshold<f64>>,
}

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static LICENSE_KEY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9][A-Za-z0-9.+-]*")
        .expect("constant regex pattern is valid")
});

const EXPRESSION_KEYWORDS: [&str; 3] = ["AND", "OR", "WITH"];

fn strictly_descending<T: PartialOrd>(thresholds: &[Threshold<T>]) -> bool {
    thresholds
        .windows(2)
        .all(|w| w[0].threshold > w[1].threshold)
}

impl PolicyDocument {
    /// Parse a policy document, rejecting non-descending threshold lists
    /// (§4.7 "a loader error is returned otherwise").
    pub fn from_yaml(content: &str) -> Result<Self, SystemError> {
        let doc: PolicyDocument = serde_yaml::from_str(content)
            .map_err(|e| SystemError::InvalidPolicy(format!("malformed policy document: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    fn validate(&self) -> Result<(), SystemError> {
        if !strictly_descending(&self.clarity_thresholds) {
            return Err(SystemError::InvalidPolicy(
                "clarity_thresholds must be strictly descending".to_string(),
            ));
        }
        if !strictly_descending(&self.scorecard_thresholds) {
            return Err(SystemError::InvalidPolicy(
                "scorecard_thresholds must be strictly descending".to_string(),
            ));
        }
        Ok(())
    }

    /// `license_policy_for(license_key)` (§4.7). Unlisted keys resolve to
    /// `{label: "Unknown", alert: missing}`.
    pub fn license_policy_for(&self, license_key: &str) -> LicensePolicy {
        self.license_policies
            .get(license_key)
            .cloned()
            .unwrap_or(LicensePolicy {
                label: "Unknown".to_string(),
                alert: Alert::Missing,
            })
    }

    /// Extract the license keys referenced by a license expression,
    /// ignoring the `AND`/`OR`/`WITH` boolean-expression keywords and
    /// surrounding parentheses (§4.7).
    pub fn license_keys_in_expression(expression: &str) -> Vec<String> {
        LICENSE_KEY_TOKEN
            .find_iter(expression)
            .map(|m| m.as_str())
            .filter(|tok| !EXPRESSION_KEYWORDS.contains(tok))
            .map(str::to_string)
            .collect()
    }

    /// `compliance_for_expression(license_expression) -> alert` (§4.7).
    pub fn compliance_for_expression(&self, license_expression: &str) -> Alert {
        Self::license_keys_in_expression(license_expression)
            .iter()
            .map(|key| self.license_policy_for(key).alert)
            .max()
            .unwrap_or(Alert::Empty)
    }

    /// `clarity_alert(score) -> alert`: the alert of the highest threshold
    /// `t` with `score >= t`, or `Empty` if no threshold is met (§4.7).
    pub fn clarity_alert(&self, score: i64) -> Alert {
        self.clarity_thresholds
            .iter()
            .find(|t| score >= t.threshold)
            .map(|t| t.alert)
            .unwrap_or(Alert::Empty)
    }

    /// `scorecard_alert(score) -> alert`, same logic as [`Self::clarity_alert`]
    /// over `f64` thresholds.
    pub fn scorecard_alert(&self, score: f64) -> Alert {
        self.scorecard_thresholds
            .iter()
            .find(|t| score >= t.threshold)
            .map(|t| t.alert)
            .unwrap_or(Alert::Empty)
    }

    /// `project_alert(project) -> alert`: the max alert across every
    /// package/resource license expression and clarity/scorecard score
    /// observed for the project (§4.7).
    pub fn project_alert(&self, inputs: &ProjectAlertInputs) -> Alert {
        inputs
            .license_expressions
            .iter()
            .map(|e| self.compliance_for_expression(e))
            .chain(inputs.clarity_scores.iter().map(|s| self.clarity_alert(*s)))
            .chain(
                inputs
                    .scorecard_scores
                    .iter()
                    .map(|s| self.scorecard_alert(*s)),
            )
            .max()
            .unwrap_or(Alert::Empty)
    }
}

/// The per-project observations fed into [`PolicyDocument::project_alert`].
#[derive(Debug, Clone, Default)]
pub struct ProjectAlertInputs {
    pub license_expressions: Vec<String>,
    pub clarity_scores: Vec<i64>,
    pub scorecard_scores: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> PolicyDocument {
        let yaml = r#"
license_policies:
  mit:
    label: MIT License
    alert: ""
  gpl-3.0:
    label: GPL 3.0
    alert: error
  proprietary-unlisted:
    label: Needs Review
    alert: warning
clarity_thresholds:
  - threshold: 80
    alert: ""
  - threshold: 50
    alert: warning
  - threshold: 0
    alert: error
scorecard_thresholds:
  - threshold: 7.0
    alert: ""
  - threshold: 4.0
    alert: warning
  - threshold: 0.0
    alert: error
"#;
        PolicyDocument::from_yaml(yaml).unwrap()
    }

    #[test]
    fn unlisted_license_defaults_to_missing() {
        let p = doc().license_policy_for("unknown-license");
        assert_eq!(p.label, "Unknown");
        assert_eq!(p.alert, Alert::Missing);
    }

    #[test]
    fn compliance_takes_max_alert_across_keys() {
        let d = doc();
        assert_eq!(
            d.compliance_for_expression("MIT AND gpl-3.0"),
            Alert::Error
        );
        assert_eq!(d.compliance_for_expression("MIT"), Alert::Empty);
        assert_eq!(
            d.compliance_for_expression("mit OR unknown-thing"),
            Alert::Missing
        );
    }

    #[test]
    fn keyword_tokens_are_excluded_from_license_keys() {
        let keys = PolicyDocument::license_keys_in_expression("mit AND (gpl-3.0 WITH exception)");
        assert_eq!(keys, vec!["mit", "gpl-3.0", "exception"]);
    }

    #[test]
    fn clarity_alert_picks_highest_met_threshold() {
        let d = doc();
        assert_eq!(d.clarity_alert(90), Alert::Empty);
        assert_eq!(d.clarity_alert(60), Alert::Warning);
        assert_eq!(d.clarity_alert(10), Alert::Error);
        assert_eq!(d.clarity_alert(-5), Alert::Empty);
    }

    #[test]
    fn scorecard_alert_picks_highest_met_threshold() {
        let d = doc();
        assert_eq!(d.scorecard_alert(8.0), Alert::Empty);
        assert_eq!(d.scorecard_alert(5.0), Alert::Warning);
        assert_eq!(d.scorecard_alert(1.0), Alert::Error);
    }

    #[test]
    fn project_alert_aggregates_max_across_all_signals() {
        let d = doc();
        let inputs = ProjectAlertInputs {
            license_expressions: vec!["mit".to_string()],
            clarity_scores: vec![90],
            scorecard_scores: vec![5.0],
        };
        assert_eq!(d.project_alert(&inputs), Alert::Warning);
    }

    #[test]
    fn project_alert_is_empty_with_no_observations() {
        let d = doc();
        assert_eq!(d.project_alert(&ProjectAlertInputs::default()), Alert::Empty);
    }

    #[test]
    fn non_descending_clarity_thresholds_are_rejected() {
        let yaml = r#"
clarity_thresholds:
  - threshold: 50
    alert: warning
  - threshold: 80
    alert: ""
"#;
        let err = PolicyDocument::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SystemError::InvalidPolicy(_)));
    }

    #[test]
    fn equal_adjacent_thresholds_are_rejected() {
        let yaml = r#"
scorecard_thresholds:
  - threshold: 5.0
    alert: warning
  - threshold: 5.0
    alert: error
"#;
        let err = PolicyDocument::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, SystemError::InvalidPolicy(_)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn doc() -> PolicyDocument {
        let yaml = r#"
license_policies:
  mit:
    label: MIT License
    alert: ""
  gpl-3.0:
    label: GPL 3.0
    alert: error
  proprietary-unlisted:
    label: Needs Review
    alert: warning
clarity_thresholds:
  - threshold: 80
    alert: ""
  - threshold: 50
    alert: warning
  - threshold: 0
    alert: error
"#;
        PolicyDocument::from_yaml(yaml).unwrap()
    }

    fn license_key() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("mit".to_string()),
            Just("gpl-3.0".to_string()),
            Just("proprietary-unlisted".to_string()),
            Just("totally-unlisted".to_string()),
        ]
    }

    proptest! {
        /// §8 "Policy precedence ... is monotone": ORing in another license
        /// key never lowers the expression's overall alert.
        #[test]
        fn adding_a_license_key_never_lowers_the_alert(
            base in license_key(),
            extra in license_key(),
        ) {
            let d = doc();
            let before = d.compliance_for_expression(&base);
            let after = d.compliance_for_expression(&format!("{base} OR {extra}"));
            prop_assert!(after >= before);
        }

        /// §8 "Clarity ... thresholds ... map any input score to the first
        /// matching tier's alert": for a descending threshold list, the
        /// result is always the alert of the highest threshold met.
        #[test]
        fn clarity_alert_matches_highest_met_threshold_by_definition(score in -100i64..200) {
            let d = doc();
            let expected = d
                .clarity_thresholds
                .iter()
                .find(|t| score >= t.threshold)
                .map(|t| t.alert)
                .unwrap_or(Alert::Empty);
            prop_assert_eq!(d.clarity_alert(score), expected);
        }
    }
}
