//! Default policy seed data
//!
//! Installs the stock governance policies on first start. Re-running is
//! idempotent: policies that already exist are skipped, never duplicated.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::audit::{AuditAction, AuditEmitter, AuditEvent};
use crate::connector::DbType;
use crate::error::GovernanceError;
use crate::policy::{EnforcementLevel, Policy, PolicyStore, RuleFlag, RuleValue, ValidationRules};

/// Outcome of one seeding run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub seeded: usize,
    pub skipped: usize,
}

fn rules(flags: &[RuleFlag]) -> ValidationRules {
    flags
        .iter()
        .map(|f| (*f, RuleValue::Enabled(true)))
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The stock governance policies
pub fn default_policies() -> Vec<Policy> {
    let now = Utc::now();

    vec![
        Policy {
            policy_id: "mongodb_schema_validation".to_string(),
            name: "MongoDB Schema Validation".to_string(),
            description: "Enforce JSON schema validation for MongoDB collections".to_string(),
            applicable_db_types: vec![DbType::Mongodb],
            enforcement_level: EnforcementLevel::Error,
            validation_rules: rules(&[
                RuleFlag::RequireSchema,
                RuleFlag::ValidateDataTypes,
                RuleFlag::EnforceRequiredFields,
                RuleFlag::CheckIndexCoverage,
            ]),
            compliance_frameworks: strings(&["SOX", "GDPR"]),
            remediation_actions: strings(&[
                "Add JSON schema validation to collections",
                "Create missing indexes",
                "Validate data consistency",
            ]),
            created_at: now,
            updated_at: now,
        },
        Policy {
            policy_id: "postgresql_referential_integrity".to_string(),
            name: "PostgreSQL Referential Integrity".to_string(),
            description: "Enforce foreign key constraints and referential integrity".to_string(),
            applicable_db_types: vec![DbType::Postgresql],
            enforcement_level: EnforcementLevel::Blocking,
            validation_rules: rules(&[
                RuleFlag::RequireForeignKeys,
                RuleFlag::ValidateConstraints,
                RuleFlag::CheckOrphanedRecords,
                RuleFlag::EnforceNotNull,
            ]),
            compliance_frameworks: strings(&["SOX", "HIPAA"]),
            remediation_actions: strings(&[
                "Add missing foreign key constraints",
                "Clean up orphaned records",
                "Add NOT NULL constraints",
            ]),
            created_at: now,
            updated_at: now,
        },
        Policy {
            policy_id: "redis_memory_optimization".to_string(),
            name: "Redis Memory Optimization".to_string(),
            description: "Optimize Redis memory usage and TTL policies".to_string(),
            applicable_db_types: vec![DbType::Redis],
            enforcement_level: EnforcementLevel::Warning,
            validation_rules: rules(&[
                RuleFlag::CheckMemoryUsage,
                RuleFlag::ValidateTtlPolicies,
                RuleFlag::MonitorKeyPatterns,
                RuleFlag::CheckDataStructures,
            ]),
            compliance_frameworks: strings(&["Performance"]),
            remediation_actions: strings(&[
                "Set appropriate TTL values",
                "Optimize data structures",
                "Clean up unused keys",
            ]),
            created_at: now,
            updated_at: now,
        },
        Policy {
            policy_id: "data_quality_standards".to_string(),
            name: "Data Quality Standards".to_string(),
            description: "Ensure data quality across all database types".to_string(),
            applicable_db_types: DbType::ALL.to_vec(),
            enforcement_level: EnforcementLevel::Error,
            validation_rules: rules(&[
                RuleFlag::CheckDataCompleteness,
                RuleFlag::ValidateDataFormats,
                RuleFlag::DetectDuplicates,
                RuleFlag::CheckDataFreshness,
            ]),
            compliance_frameworks: strings(&["SOX", "GDPR", "HIPAA"]),
            remediation_actions: strings(&[
                "Clean duplicate records",
                "Standardize data formats",
                "Update stale data",
            ]),
            created_at: now,
            updated_at: now,
        },
    ]
}

/// Seed the default policies, skipping any that already exist
pub async fn seed_default_policies(
    store: &PolicyStore,
    audit: &AuditEmitter,
) -> Result<SeedReport, GovernanceError> {
    let mut seeded = 0;
    let mut skipped = 0;

    for policy in default_policies() {
        let policy_id = policy.policy_id.clone();
        match store.register(policy).await {
            Ok(_) => {
                debug!("Seeded default policy '{}'", policy_id);
                seeded += 1;
            }
            Err(GovernanceError::DuplicateIdentifier(_)) => {
                debug!("Default policy '{}' already present, skipping", policy_id);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    audit
        .emit(
            AuditEvent::new("policy_store", AuditAction::PoliciesSeeded)
                .with_details(json!({ "seeded": seeded, "skipped": skipped })),
        )
        .await?;

    info!("Policy seeding complete: {} seeded, {} skipped", seeded, skipped);
    Ok(SeedReport { seeded, skipped })
}
