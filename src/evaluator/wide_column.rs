//! Wide-column rule evaluator (Cosmos DB-family targets)

use serde_json::json;

use crate::connector::{DbType, TargetInspection};
use crate::evaluator::{
    missing_data_findings, remediation_for, EvaluationError, Finding, RuleEvaluator, Severity,
};
use crate::policy::{Policy, RuleFlag};
use crate::registry::Connection;

/// Default RU/s ceiling before provisioning looks excessive
const DEFAULT_THROUGHPUT_LIMIT: f64 = 10_000.0;

pub struct WideColumnEvaluator;

impl RuleEvaluator for WideColumnEvaluator {
    fn db_type(&self) -> DbType {
        DbType::CosmosDb
    }

    fn evaluate(
        &self,
        _connection: &Connection,
        policy: &Policy,
        inspection: &TargetInspection,
    ) -> Result<Vec<Finding>, EvaluationError> {
        let Some(containers) = &inspection.containers else {
            return Ok(missing_data_findings(
                policy,
                "container",
                &[RuleFlag::RequirePartitionKey],
            ));
        };

        let mut findings = Vec::new();
        for container in containers {
            if policy.rule_enabled(RuleFlag::RequirePartitionKey) && !container.has_partition_key {
                findings.push(Finding {
                    rule: RuleFlag::RequirePartitionKey.to_string(),
                    severity: Severity::High,
                    description: format!(
                        "container '{}' has no partition key defined",
                        container.name
                    ),
                    payload: json!({
                        "container": container.name,
                        "issue": "missing_partition_key",
                    }),
                    remediation: remediation_for(policy, &["partition"]),
                });
            }

            if policy.rule_enabled(RuleFlag::CheckThroughputProvisioning) {
                let limit =
                    policy.rule_limit(RuleFlag::CheckThroughputProvisioning, DEFAULT_THROUGHPUT_LIMIT);
                if let Some(ru) = container
                    .provisioned_throughput
                    .filter(|ru| *ru as f64 > limit)
                {
                    findings.push(Finding {
                        rule: RuleFlag::CheckThroughputProvisioning.to_string(),
                        severity: Severity::Low,
                        description: format!(
                            "container '{}' provisions {} RU/s (limit {:.0})",
                            container.name, ru, limit
                        ),
                        payload: json!({
                            "container": container.name,
                            "provisionedThroughput": ru,
                            "limit": limit,
                        }),
                        remediation: remediation_for(policy, &["throughput"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::DetectDuplicates) {
                if let Some(dupes) = container.duplicate_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::DetectDuplicates.to_string(),
                        severity: Severity::Medium,
                        description: format!(
                            "container '{}' contains {} duplicate documents",
                            container.name, dupes
                        ),
                        payload: json!({
                            "container": container.name,
                            "duplicateCount": dupes,
                        }),
                        remediation: remediation_for(policy, &["duplicate"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::CheckDataFreshness) {
                if let Some(stale) = container.stale_document_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckDataFreshness.to_string(),
                        severity: Severity::Low,
                        description: format!(
                            "container '{}' contains {} stale documents",
                            container.name, stale
                        ),
                        payload: json!({
                            "container": container.name,
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
