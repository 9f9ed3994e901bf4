//! Key-value rule evaluator (Redis-family targets)

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::connector::{DbType, TargetInspection};
use crate::evaluator::{remediation_for, EvaluationError, Finding, RuleEvaluator, Severity};
use crate::policy::{Policy, RuleFlag};
use crate::registry::Connection;

/// Default memory ceiling in MB, overridable per policy
const DEFAULT_MEMORY_LIMIT_MB: f64 = 1024.0;

/// Default tolerated count of sampled keys without TTL
const DEFAULT_TTL_FREE_KEYS: f64 = 10.0;

/// Keys are expected to carry a `namespace:` prefix
static NAMESPACED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+:").expect("valid key pattern"));

pub struct KeyValueEvaluator;

impl RuleEvaluator for KeyValueEvaluator {
    fn db_type(&self) -> DbType {
        DbType::Redis
    }

    fn evaluate(
        &self,
        _connection: &Connection,
        policy: &Policy,
        inspection: &TargetInspection,
    ) -> Result<Vec<Finding>, EvaluationError> {
        // No require_* flags in this family: an absent keyspace skips everything
        let Some(keyspace) = &inspection.keyspace else {
            return Ok(Vec::new());
        };

        let mut findings = Vec::new();

        if policy.rule_enabled(RuleFlag::CheckMemoryUsage) {
            let limit = policy.rule_limit(RuleFlag::CheckMemoryUsage, DEFAULT_MEMORY_LIMIT_MB);
            if let Some(used) = keyspace.used_memory_mb.filter(|m| *m > limit) {
                findings.push(Finding {
                    rule: RuleFlag::CheckMemoryUsage.to_string(),
                    severity: Severity::Medium,
                    description: format!("high memory usage: {:.2} MB (limit {:.0} MB)", used, limit),
                    payload: json!({
                        "memoryUsageMb": used,
                        "limitMb": limit,
                    }),
                    remediation: remediation_for(policy, &["ttl", "unused keys"]),
                });
            }
        }

        if policy.rule_enabled(RuleFlag::ValidateTtlPolicies) {
            let tolerated = policy.rule_limit(RuleFlag::ValidateTtlPolicies, DEFAULT_TTL_FREE_KEYS);
            if let Some(bare) = keyspace
                .keys_without_ttl
                .filter(|n| *n as f64 > tolerated)
            {
                findings.push(Finding {
                    rule: RuleFlag::ValidateTtlPolicies.to_string(),
                    severity: Severity::Low,
                    description: format!(
                        "found {} keys without TTL in a sample of {}",
                        bare, keyspace.sampled_keys
                    ),
                    payload: json!({
                        "keysWithoutTtl": bare,
                        "sampledKeys": keyspace.sampled_keys,
                    }),
                    remediation: remediation_for(policy, &["ttl"]),
                });
            }
        }

        if policy.rule_enabled(RuleFlag::MonitorKeyPatterns) && !keyspace.key_samples.is_empty() {
            let unnamespaced: Vec<&String> = keyspace
                .key_samples
                .iter()
                .filter(|key| !NAMESPACED_KEY.is_match(key))
                .collect();
            if !unnamespaced.is_empty() {
                findings.push(Finding {
                    rule: RuleFlag::MonitorKeyPatterns.to_string(),
                    severity: Severity::Low,
                    description: format!(
                        "{} sampled keys do not follow the 'namespace:' convention",
                        unnamespaced.len()
                    ),
                    payload: json!({
                        "unnamespacedCount": unnamespaced.len(),
                        "examples": unnamespaced.iter().take(5).collect::<Vec<_>>(),
                    }),
                    remediation: remediation_for(policy, &["data structures", "keys"]),
                });
            }
        }

        if policy.rule_enabled(RuleFlag::CheckDataStructures) {
            if let Some(oversized) = keyspace.oversized_value_count.filter(|n| *n > 0) {
                findings.push(Finding {
                    rule: RuleFlag::CheckDataStructures.to_string(),
                    severity: Severity::Medium,
                    description: format!("{} sampled values exceed the recommended size", oversized),
                    payload: json!({
                        "oversizedValueCount": oversized,
                    }),
                    remediation: remediation_for(policy, &["data structures"]),
                });
            }
        }

        if policy.rule_enabled(RuleFlag::CheckDataFreshness) {
            if let Some(stale) = keyspace.stale_key_count.filter(|n| *n > 0) {
                findings.push(Finding {
                    rule: RuleFlag::CheckDataFreshness.to_string(),
                    severity: Severity::Low,
                    description: format!("{} sampled keys look stale", stale),
                    payload: json!({
                        "staleKeyCount": stale,
                    }),
                    remediation: remediation_for(policy, &["stale", "unused keys"]),
                });
            }
        }

        Ok(findings)
    }
}
