//! Relational rule evaluator (PostgreSQL-family targets)

use serde_json::json;

use crate::connector::{DbType, TargetInspection};
use crate::evaluator::{
    missing_data_findings, remediation_for, EvaluationError, Finding, RuleEvaluator, Severity,
};
use crate::policy::{Policy, RuleFlag};
use crate::registry::Connection;

/// Tables that typically do not carry foreign keys (lookup/append-only)
const FK_EXEMPT_NAMES: [&str; 4] = ["log", "audit", "temp", "cache"];

pub struct RelationalEvaluator;

fn fk_exempt(table_name: &str) -> bool {
    let lower = table_name.to_lowercase();
    FK_EXEMPT_NAMES.iter().any(|skip| lower.contains(skip))
}

impl RuleEvaluator for RelationalEvaluator {
    fn db_type(&self) -> DbType {
        DbType::Postgresql
    }

    fn evaluate(
        &self,
        _connection: &Connection,
        policy: &Policy,
        inspection: &TargetInspection,
    ) -> Result<Vec<Finding>, EvaluationError> {
        let Some(tables) = &inspection.tables else {
            return Ok(missing_data_findings(
                policy,
                "table",
                &[RuleFlag::RequireForeignKeys],
            ));
        };

        let mut findings = Vec::new();
        for table in tables {
            if policy.rule_enabled(RuleFlag::RequireForeignKeys)
                && table.foreign_key_count == 0
                && !fk_exempt(&table.name)
            {
                findings.push(Finding {
                    rule: RuleFlag::RequireForeignKeys.to_string(),
                    severity: Severity::High,
                    description: format!("table '{}' has no foreign key constraints", table.name),
                    payload: json!({
                        "table": table.name,
                        "foreignKeyCount": 0,
                    }),
                    remediation: remediation_for(policy, &["foreign key"]),
                });
            }

            if policy.rule_enabled(RuleFlag::EnforceNotNull) {
                if let Some(nulls) = table.null_in_not_null_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::EnforceNotNull.to_string(),
                        severity: Severity::High,
                        description: format!(
                            "table '{}' has {} NULL values in NOT NULL columns",
                            table.name, nulls
                        ),
                        payload: json!({
                            "table": table.name,
                            "nullCount": nulls,
                        }),
                        remediation: remediation_for(policy, &["not null"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::CheckOrphanedRecords) {
                if let Some(orphans) = table.orphaned_row_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckOrphanedRecords.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "table '{}' has {} orphaned rows",
                            table.name, orphans
                        ),
                        payload: json!({
                            "table": table.name,
                            "orphanedRowCount": orphans,
                        }),
                        remediation: remediation_for(policy, &["orphaned"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::ValidateConstraints) {
                if let Some(invalid) = table.invalid_constraint_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::ValidateConstraints.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "table '{}' has {} constraints failing validation",
                            table.name, invalid
                        ),
                        payload: json!({
                            "table": table.name,
                            "invalidConstraintCount": invalid,
                        }),
                        remediation: remediation_for(policy, &["constraint"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::CheckDataCompleteness) {
                if let Some(nulls) = table.null_in_not_null_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckDataCompleteness.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "table '{}' has {} incomplete rows",
                            table.name, nulls
                        ),
                        payload: json!({
                            "table": table.name,
                            "incompleteRowCount": nulls,
                        }),
                        remediation: remediation_for(policy, &["completeness", "stale"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::DetectDuplicates) {
                if let Some(dupes) = table.duplicate_row_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::DetectDuplicates.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "table '{}' contains {} duplicate rows",
                            table.name, dupes
                        ),
                        payload: json!({
                            "table": table.name,
                            "duplicateRowCount": dupes,
                        }),
                        remediation: remediation_for(policy, &["duplicate"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::ValidateDataFormats) {
                if let Some(anomalies) = table.format_anomaly_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::ValidateDataFormats.to_string(),
                        severity: Severity::Low,
                        description: format!(
                            "table '{}' has {} rows with format anomalies",
                            table.name, anomalies
                        ),
                        payload: json!({
                            "table": table.name,
                            "anomalyCount": anomalies,
                        }),
                        remediation: remediation_for(policy, &["format"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::CheckDataFreshness) {
                if let Some(stale) = table.stale_row_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckDataFreshness.to_string(),
                        severity: Severity::Low,
                        description: format!("table '{}' contains {} stale rows", table.name, stale),
                        payload: json!({
                            "table": table.name,
                            "staleRowCount": stale,
                        }),
                        remediation: remediation_for(policy, &["stale"]),
                    });
                }
            }
        }

        Ok(findings)
    }
}
