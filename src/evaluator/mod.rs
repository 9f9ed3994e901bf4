//! Rule Evaluators
//!
//! One evaluator per database family, each checking a policy's validation
//! rules against a captured target inspection. Evaluators are pure over the
//! inspection: they never touch the live target.

mod document;
mod key_value;
mod object_storage;
mod relational;
mod wide_column;

pub use document::DocumentEvaluator;
pub use key_value::KeyValueEvaluator;
pub use object_storage::ObjectStorageEvaluator;
pub use relational::RelationalEvaluator;
pub use wide_column::WideColumnEvaluator;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::connector::{DbType, TargetInspection};
use crate::policy::{Policy, RuleFlag};
use crate::registry::Connection;

/// Violation severity, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single rule-check result, not yet persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    pub description: String,
    pub payload: Value,
    pub remediation: Vec<String>,
}

/// A rule-specific failure inside one policy evaluation
#[derive(Error, Debug)]
#[error("{0}")]
pub struct EvaluationError(pub String);

/// Capability: evaluate one policy's validation rules against one connection
pub trait RuleEvaluator: Send + Sync {
    /// Database family this evaluator understands
    fn db_type(&self) -> DbType;

    /// Check `policy.validation_rules` against the captured inspection
    fn evaluate(
        &self,
        connection: &Connection,
        policy: &Policy,
        inspection: &TargetInspection,
    ) -> Result<Vec<Finding>, EvaluationError>;
}

/// Central dispatch: the evaluator for a connection's database type
pub fn evaluator_for(db_type: DbType) -> &'static dyn RuleEvaluator {
    match db_type {
        DbType::Mongodb => &DocumentEvaluator,
        DbType::Postgresql => &RelationalEvaluator,
        DbType::Redis => &KeyValueEvaluator,
        DbType::CosmosDb => &WideColumnEvaluator,
        DbType::BlobStorage => &ObjectStorageEvaluator,
    }
}

/// Remediation suggestions for a failing rule: the policy's actions filtered
/// by keyword, falling back to the full list when nothing matches.
pub(crate) fn remediation_for(policy: &Policy, keywords: &[&str]) -> Vec<String> {
    let matched: Vec<String> = policy
        .remediation_actions
        .iter()
        .filter(|action| {
            let lower = action.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .cloned()
        .collect();
    if matched.is_empty() {
        policy.remediation_actions.clone()
    } else {
        matched
    }
}

/// Findings for `require_*` flags when the inspection carries no data for
/// them: absence of proof is itself a violation for those flags.
pub(crate) fn missing_data_findings(
    policy: &Policy,
    section: &str,
    flags: &[RuleFlag],
) -> Vec<Finding> {
    flags
        .iter()
        .filter(|flag| flag.demands_presence() && policy.rule_enabled(**flag))
        .map(|flag| Finding {
            rule: flag.to_string(),
            severity: Severity::High,
            description: format!(
                "inspection reported no {} data; compliance with '{}' cannot be shown",
                section, flag
            ),
            payload: json!({
                "issue": "missing_inspection_data",
                "section": section,
                "rule": flag.as_str(),
            }),
            remediation: policy.remediation_actions.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{EnforcementLevel, RuleValue, ValidationRules};
    use chrono::Utc;

    pub(crate) fn test_policy(
        id: &str,
        level: EnforcementLevel,
        db_types: Vec<DbType>,
        flags: &[RuleFlag],
    ) -> Policy {
        Policy {
            policy_id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            applicable_db_types: db_types,
            enforcement_level: level,
            validation_rules: flags
                .iter()
                .map(|f| (*f, RuleValue::Enabled(true)))
                .collect::<ValidationRules>(),
            compliance_frameworks: vec![],
            remediation_actions: vec![
                "Add missing foreign key constraints".to_string(),
                "Clean up orphaned records".to_string(),
                "Set appropriate TTL values".to_string(),
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn test_connection(name: &str, db_type: DbType) -> Connection {
        use crate::registry::{ConnectionStatus, Environment};
        Connection {
            name: name.to_string(),
            db_type,
            module_name: "test-module".to_string(),
            environment: Environment::Development,
            governance_policies: vec![],
            compliance_frameworks: vec![],
            status: ConnectionStatus::Active,
            last_health_check: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_dispatch_covers_every_db_type() {
        for db_type in DbType::ALL {
            assert_eq!(evaluator_for(db_type).db_type(), db_type);
        }
    }

    #[test]
    fn test_remediation_keyword_filter() {
        let policy = test_policy(
            "p",
            EnforcementLevel::Warning,
            vec![DbType::Postgresql],
            &[],
        );

        let matched = remediation_for(&policy, &["foreign key"]);
        assert_eq!(matched, vec!["Add missing foreign key constraints"]);

        // No keyword hit falls back to the full list
        let fallback = remediation_for(&policy, &["nonexistent"]);
        assert_eq!(fallback.len(), 3);
    }

    #[test]
    fn test_missing_data_findings_only_for_require_flags() {
        let policy = test_policy(
            "p",
            EnforcementLevel::Blocking,
            vec![DbType::Postgresql],
            &[RuleFlag::RequireForeignKeys, RuleFlag::CheckOrphanedRecords],
        );

        let findings = missing_data_findings(
            &policy,
            "table",
            &[RuleFlag::RequireForeignKeys, RuleFlag::CheckOrphanedRecords],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "require_foreign_keys");
        assert_eq!(findings[0].severity, Severity::High);
    }
}
