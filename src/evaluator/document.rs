//! Document-store rule evaluator (MongoDB-family targets)

use serde_json::json;

use crate::connector::{DbType, TargetInspection};
use crate::evaluator::{
    missing_data_findings, remediation_for, EvaluationError, Finding, RuleEvaluator, Severity,
};
use crate::policy::{Policy, RuleFlag};
use crate::registry::Connection;

/// Minimum average field count before a collection looks incomplete
const MIN_AVG_FIELDS: f64 = 3.0;

pub struct DocumentEvaluator;

impl RuleEvaluator for DocumentEvaluator {
    fn db_type(&self) -> DbType {
        DbType::Mongodb
    }

    fn evaluate(
        &self,
        _connection: &Connection,
        policy: &Policy,
        inspection: &TargetInspection,
    ) -> Result<Vec<Finding>, EvaluationError> {
        let Some(collections) = &inspection.collections else {
            return Ok(missing_data_findings(
                policy,
                "collection",
                &[RuleFlag::RequireSchema],
            ));
        };

        let mut findings = Vec::new();
        for col in collections {
            if policy.rule_enabled(RuleFlag::RequireSchema) && !col.has_validator {
                findings.push(Finding {
                    rule: RuleFlag::RequireSchema.to_string(),
                    severity: Severity::Medium,
                    description: format!("collection '{}' lacks schema validation", col.name),
                    payload: json!({
                        "collection": col.name,
                        "issue": "missing_schema_validation",
                    }),
                    remediation: remediation_for(policy, &["schema"]),
                });
            }

            // Only the default id index counts as uncovered
            if policy.rule_enabled(RuleFlag::CheckIndexCoverage) && col.index_count <= 1 {
                findings.push(Finding {
                    rule: RuleFlag::CheckIndexCoverage.to_string(),
                    severity: Severity::Low,
                    description: format!("collection '{}' may lack proper indexing", col.name),
                    payload: json!({
                        "collection": col.name,
                        "indexCount": col.index_count,
                    }),
                    remediation: remediation_for(policy, &["index"]),
                });
            }

            if policy.rule_enabled(RuleFlag::EnforceRequiredFields) {
                if let Some(missing) = col.missing_required_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::EnforceRequiredFields.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "collection '{}' has {} documents missing required fields",
                            col.name, missing
                        ),
                        payload: json!({
                            "collection": col.name,
                            "missingRequiredCount": missing,
                        }),
                        remediation: remediation_for(policy, &["schema", "consistency"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::ValidateDataTypes) {
                if let Some(anomalies) = col.format_anomaly_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::ValidateDataTypes.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "collection '{}' has {} documents with type anomalies",
                            col.name, anomalies
                        ),
                        payload: json!({
                            "collection": col.name,
                            "anomalyCount": anomalies,
                        }),
                        remediation: remediation_for(policy, &["consistency", "format"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::CheckDataCompleteness) {
                if let Some(avg) = col.avg_fields_per_document.filter(|a| *a < MIN_AVG_FIELDS) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckDataCompleteness.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "collection '{}' has documents with few fields (avg: {:.1})",
                            col.name, avg
                        ),
                        payload: json!({
                            "collection": col.name,
                            "avgFields": avg,
                        }),
                        remediation: remediation_for(policy, &["completeness", "stale"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::DetectDuplicates) {
                if let Some(dupes) = col.duplicate_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::DetectDuplicates.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "collection '{}' contains {} duplicate documents",
                            col.name, dupes
                        ),
                        payload: json!({
                            "collection": col.name,
                            "duplicateCount": dupes,
                        }),
                        remediation: remediation_for(policy, &["duplicate"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::ValidateDataFormats) {
                if let Some(anomalies) = col.format_anomaly_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::ValidateDataFormats.to_string(),
                        severity: Severity::Low,
                        description: format!(
                            "collection '{}' has {} documents with format anomalies",
                            col.name, anomalies
                        ),
                        payload: json!({
                            "collection": col.name,
                            "anomalyCount": anomalies,
                        }),
                        remediation: remediation_for(policy, &["format"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::CheckDataFreshness) {
                if let Some(stale) = col.stale_document_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckDataFreshness.to_string(),
                        severity: Severity::Low,
                        description: format!(
                            "collection '{}' contains {} stale documents",
                            col.name, stale
                        ),
                        payload: json!({
                            "collection": col.name,
                            "staleCount": stale,
                        }),
                        remediation: remediation_for(policy, &["stale"]),
                    });
                }
            }
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::CollectionStats;
    use crate::evaluator::tests::{test_connection, test_policy};
    use crate::policy::EnforcementLevel;

    fn inspection_with(collections: Vec<CollectionStats>) -> TargetInspection {
        TargetInspection {
            collections: Some(collections),
            ..TargetInspection::empty()
        }
    }

    fn schema_policy() -> Policy {
        test_policy(
            "mongodb_schema_validation",
            EnforcementLevel::Error,
            vec![DbType::Mongodb],
            &[
                RuleFlag::RequireSchema,
                RuleFlag::ValidateDataTypes,
                RuleFlag::EnforceRequiredFields,
                RuleFlag::CheckIndexCoverage,
            ],
        )
    }

    #[test]
    fn test_flags_collection_without_validator() {
        let conn = test_connection("docs", DbType::Mongodb);
        let inspection = inspection_with(vec![CollectionStats {
            name: "users".to_string(),
            has_validator: false,
            index_count: 3,
            ..CollectionStats::default()
        }]);

        let findings = DocumentEvaluator
            .evaluate(&conn, &schema_policy(), &inspection)
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "require_schema");
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_index_coverage_counts_only_default_index() {
        let conn = test_connection("docs", DbType::Mongodb);
        let inspection = inspection_with(vec![CollectionStats {
            name: "events".to_string(),
            has_validator: true,
            index_count: 1,
            ..CollectionStats::default()
        }]);

        let findings = DocumentEvaluator
            .evaluate(&conn, &schema_policy(), &inspection)
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "check_index_coverage");
    }

    #[test]
    fn test_absent_section_violates_require_schema_only() {
        let conn = test_connection("docs", DbType::Mongodb);
        let findings = DocumentEvaluator
            .evaluate(&conn, &schema_policy(), &TargetInspection::empty())
            .unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "require_schema");
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_unmeasured_quality_signals_are_skipped() {
        let conn = test_connection("docs", DbType::Mongodb);
        let policy = test_policy(
            "data_quality_standards",
            EnforcementLevel::Error,
            vec![DbType::Mongodb],
            &[
                RuleFlag::CheckDataCompleteness,
                RuleFlag::DetectDuplicates,
                RuleFlag::CheckDataFreshness,
            ],
        );
        let inspection = inspection_with(vec![CollectionStats {
            name: "orders".to_string(),
            has_validator: true,
            index_count: 4,
            ..CollectionStats::default()
        }]);

        let findings = DocumentEvaluator.evaluate(&conn, &policy, &inspection).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_sparse_collection_fails_completeness() {
        let conn = test_connection("docs", DbType::Mongodb);
        let policy = test_policy(
            "data_quality_standards",
            EnforcementLevel::Error,
            vec![DbType::Mongodb],
            &[RuleFlag::CheckDataCompleteness],
        );
        let inspection = inspection_with(vec![CollectionStats {
            name: "orders".to_string(),
            has_validator: true,
            index_count: 4,
            avg_fields_per_document: Some(1.8),
            ..CollectionStats::default()
        }]);

        let findings = DocumentEvaluator.evaluate(&conn, &policy, &inspection).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "check_data_completeness");
    }
}
