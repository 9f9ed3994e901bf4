//! Governance policies
//!
//! Policy definitions, the policy store, and the default policy seed data.

mod seed;
mod store;

pub use seed::{default_policies, seed_default_policies, SeedReport};
pub use store::PolicyStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::connector::DbType;
use crate::error::GovernanceError;
use crate::evaluator::Severity;

/// Policy enforcement level, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementLevel {
    Warning,
    Error,
    Blocking,
}

impl EnforcementLevel {
    /// Minimum finding severity this level turns into a violation.
    ///
    /// `blocking` policies flag every finding; `error` policies flag
    /// medium and above; `warning` policies flag everything as well.
    pub fn severity_floor(self) -> Severity {
        match self {
            EnforcementLevel::Blocking | EnforcementLevel::Warning => Severity::Low,
            EnforcementLevel::Error => Severity::Medium,
        }
    }
}

/// Named validation-rule flags understood by the rule evaluators.
///
/// Flags whose name starts with `require_` demand that the inspected target
/// can prove compliance: absent data is itself a violation. All other
/// prefixes (`check_`, `validate_`, `monitor_`, `enforce_`, `detect_`) skip
/// when the inspection carries no data for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFlag {
    // Document stores
    RequireSchema,
    ValidateDataTypes,
    EnforceRequiredFields,
    CheckIndexCoverage,

    // Relational stores
    RequireForeignKeys,
    ValidateConstraints,
    CheckOrphanedRecords,
    EnforceNotNull,

    // Key-value stores
    CheckMemoryUsage,
    ValidateTtlPolicies,
    MonitorKeyPatterns,
    CheckDataStructures,

    // Wide-column stores
    RequirePartitionKey,
    CheckThroughputProvisioning,

    // Object storage
    RequirePrivateAccess,
    CheckLifecyclePolicies,

    // Cross-type data quality
    CheckDataCompleteness,
    ValidateDataFormats,
    DetectDuplicates,
    CheckDataFreshness,
}

impl RuleFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleFlag::RequireSchema => "require_schema",
            RuleFlag::ValidateDataTypes => "validate_data_types",
            RuleFlag::EnforceRequiredFields => "enforce_required_fields",
            RuleFlag::CheckIndexCoverage => "check_index_coverage",
            RuleFlag::RequireForeignKeys => "require_foreign_keys",
            RuleFlag::ValidateConstraints => "validate_constraints",
            RuleFlag::CheckOrphanedRecords => "check_orphaned_records",
            RuleFlag::EnforceNotNull => "enforce_not_null",
            RuleFlag::CheckMemoryUsage => "check_memory_usage",
            RuleFlag::ValidateTtlPolicies => "validate_ttl_policies",
            RuleFlag::MonitorKeyPatterns => "monitor_key_patterns",
            RuleFlag::CheckDataStructures => "check_data_structures",
            RuleFlag::RequirePartitionKey => "require_partition_key",
            RuleFlag::CheckThroughputProvisioning => "check_throughput_provisioning",
            RuleFlag::RequirePrivateAccess => "require_private_access",
            RuleFlag::CheckLifecyclePolicies => "check_lifecycle_policies",
            RuleFlag::CheckDataCompleteness => "check_data_completeness",
            RuleFlag::ValidateDataFormats => "validate_data_formats",
            RuleFlag::DetectDuplicates => "detect_duplicates",
            RuleFlag::CheckDataFreshness => "check_data_freshness",
        }
    }

    /// Whether absent inspection data violates this flag outright
    pub fn demands_presence(&self) -> bool {
        matches!(
            self,
            RuleFlag::RequireSchema
                | RuleFlag::RequireForeignKeys
                | RuleFlag::RequirePartitionKey
                | RuleFlag::RequirePrivateAccess
        )
    }
}

impl fmt::Display for RuleFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a validation-rule flag: a simple on/off switch or a numeric limit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Enabled(bool),
    Limit(f64),
}

impl RuleValue {
    pub fn is_enabled(&self) -> bool {
        match self {
            RuleValue::Enabled(on) => *on,
            RuleValue::Limit(_) => true,
        }
    }

    pub fn limit(&self) -> Option<f64> {
        match self {
            RuleValue::Enabled(_) => None,
            RuleValue::Limit(n) => Some(*n),
        }
    }
}

/// Validation rules carried by a policy
pub type ValidationRules = BTreeMap<RuleFlag, RuleValue>;

/// A governance policy definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub policy_id: String,
    pub name: String,
    pub description: String,
    pub applicable_db_types: Vec<DbType>,
    pub enforcement_level: EnforcementLevel,
    pub validation_rules: ValidationRules,
    pub compliance_frameworks: Vec<String>,
    pub remediation_actions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Whether this policy applies to the given database type
    pub fn applies_to(&self, db_type: DbType) -> bool {
        self.applicable_db_types.contains(&db_type)
    }

    /// Whether a validation-rule flag is enabled on this policy
    pub fn rule_enabled(&self, flag: RuleFlag) -> bool {
        self.validation_rules
            .get(&flag)
            .map(RuleValue::is_enabled)
            .unwrap_or(false)
    }

    /// Numeric limit for a flag, falling back to the rule's default
    pub fn rule_limit(&self, flag: RuleFlag, default: f64) -> f64 {
        self.validation_rules
            .get(&flag)
            .and_then(RuleValue::limit)
            .unwrap_or(default)
    }

    /// Validate the policy's own invariants before it enters the store
    pub fn validated(self) -> Result<Self, GovernanceError> {
        if self.policy_id.trim().is_empty() {
            return Err(GovernanceError::Validation(
                "policy_id must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(GovernanceError::Validation(
                "policy name must not be empty".to_string(),
            ));
        }
        if self.applicable_db_types.is_empty() {
            return Err(GovernanceError::Validation(
                "policy must apply to at least one database type".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for db_type in &self.applicable_db_types {
            if !seen.insert(*db_type) {
                return Err(GovernanceError::Validation(format!(
                    "duplicate applicable database type '{}'",
                    db_type
                )));
            }
        }
        Ok(self)
    }
}
