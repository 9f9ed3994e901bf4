//! Object-storage rule evaluator (Blob Storage-family targets)

use serde_json::json;

use crate::connector::{DbType, TargetInspection};
use crate::evaluator::{
    missing_data_findings, remediation_for, EvaluationError, Finding, RuleEvaluator, Severity,
};
use crate::policy::{Policy, RuleFlag};
use crate::registry::Connection;

pub struct ObjectStorageEvaluator;

impl RuleEvaluator for ObjectStorageEvaluator {
    fn db_type(&self) -> DbType {
        DbType::BlobStorage
    }

    fn evaluate(
        &self,
        _connection: &Connection,
        policy: &Policy,
        inspection: &TargetInspection,
    ) -> Result<Vec<Finding>, EvaluationError> {
        let Some(buckets) = &inspection.buckets else {
            return Ok(missing_data_findings(
                policy,
                "bucket",
                &[RuleFlag::RequirePrivateAccess],
            ));
        };

        let mut findings = Vec::new();
        for bucket in buckets {
            if policy.rule_enabled(RuleFlag::RequirePrivateAccess) && bucket.public_access {
                findings.push(Finding {
                    rule: RuleFlag::RequirePrivateAccess.to_string(),
                    severity: Severity::Critical,
                    description: format!("bucket '{}' allows public access", bucket.name),
                    payload: json!({
                        "bucket": bucket.name,
                        "issue": "public_access",
                    }),
                    remediation: remediation_for(policy, &["access"]),
                });
            }

            if policy.rule_enabled(RuleFlag::CheckLifecyclePolicies) && !bucket.has_lifecycle_policy
            {
                findings.push(Finding {
                    rule: RuleFlag::CheckLifecyclePolicies.to_string(),
                    severity: Severity::Low,
                    description: format!("bucket '{}' has no lifecycle policy", bucket.name),
                    payload: json!({
                        "bucket": bucket.name,
                        "issue": "missing_lifecycle_policy",
                    }),
                    remediation: remediation_for(policy, &["lifecycle"]),
                });
            }

            if policy.rule_enabled(RuleFlag::CheckDataCompleteness) {
                if let Some(untagged) = bucket.untagged_blob_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckDataCompleteness.to_string(),
                        severity: Severity::Low,
                        description: format!(
                            "bucket '{}' has {} blobs without classification tags",
                            bucket.name, untagged
                        ),
                        payload: json!({
                            "bucket": bucket.name,
                            "untaggedBlobCount": untagged,
                        }),
                        remediation: remediation_for(policy, &["completeness", "format"]),
                    });
                }
            }

            if policy.rule_enabled(RuleFlag::CheckDataFreshness) {
                if let Some(stale) = bucket.stale_blob_count.filter(|n| *n > 0) {
                    findings.push(Finding {
                        rule: RuleFlag::CheckDataFreshness.to_string(),
                        severity: Severity::Low,
                        description: format!(
                            "bucket '{}' contains {} stale blobs",
                            bucket.name, stale
                        ),
                        payload: json!({
                            "bucket": bucket.name,
                            "staleBlobCount": stale,
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
    use crate::connector::BucketStats;
    use crate::evaluator::tests::{test_connection, test_policy};
    use crate::policy::EnforcementLevel;

    fn inspection_with(buckets: Vec<BucketStats>) -> TargetInspection {
        TargetInspection {
            buckets: Some(buckets),
            ..TargetInspection::empty()
        }
    }

    fn access_policy() -> Policy {
        test_policy(
            "blob_access_controls",
            EnforcementLevel::Blocking,
            vec![DbType::BlobStorage],
            &[
                RuleFlag::RequirePrivateAccess,
                RuleFlag::CheckLifecyclePolicies,
            ],
        )
    }

    #[test]
    fn test_public_bucket_is_critical() {
        let conn = test_connection("blobs", DbType::BlobStorage);
        let inspection = inspection_with(vec![BucketStats {
            name: "exports".to_string(),
            public_access: true,
            has_lifecycle_policy: true,
            ..BucketStats::default()
        }]);

        let findings = ObjectStorageEvaluator
            .evaluate(&conn, &access_policy(), &inspection)
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "require_private_access");
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_missing_lifecycle_policy_is_low() {
        let conn = test_connection("blobs", DbType::BlobStorage);
        let inspection = inspection_with(vec![BucketStats {
            name: "archive".to_string(),
            public_access: false,
            has_lifecycle_policy: false,
            ..BucketStats::default()
        }]);

        let findings = ObjectStorageEvaluator
            .evaluate(&conn, &access_policy(), &inspection)
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "check_lifecycle_policies");
        assert_eq!(findings[0].severity, Severity::Low);
    }

    #[test]
    fn test_compliant_bucket_passes() {
        let conn = test_connection("blobs", DbType::BlobStorage);
        let inspection = inspection_with(vec![BucketStats {
            name: "archive".to_string(),
            public_access: false,
            has_lifecycle_policy: true,
            ..BucketStats::default()
        }]);

        let findings = ObjectStorageEvaluator
            .evaluate(&conn, &access_policy(), &inspection)
            .unwrap();
        assert!(findings.is_empty());
    }
}
