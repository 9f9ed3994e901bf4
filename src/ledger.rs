//! Violation Ledger
//!
//! Persists violation records and manages their lifecycle. Violations are
//! deduplicated by fingerprint: one open record per (connection, policy,
//! payload signature), refreshed rather than duplicated on re-detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::GovernanceError;
use crate::evaluator::Severity;

/// Violation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Open,
    InProgress,
    Resolved,
    Ignored,
}

/// A persisted governance violation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub violation_id: Uuid,
    pub connection_name: String,
    pub policy_id: String,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub violation_data: Value,
    pub remediation_suggested: Vec<String>,
    pub status: ViolationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    pub fingerprint: String,
}

/// Outcome of a ledger upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No record existed for the fingerprint; a new open violation was stored
    Created,
    /// An open or in-progress record existed; its detection time was refreshed
    Confirmed,
    /// A resolved record existed; it was reopened (regression)
    Reopened,
    /// An ignored record existed; it was left untouched
    Suppressed,
}

/// Canonical JSON rendering with object keys sorted recursively, so payload
/// signatures do not depend on construction order.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

/// Deduplication key for a violation: connection, policy, payload signature
pub fn fingerprint(connection_name: &str, policy_id: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(connection_name.as_bytes());
    hasher.update(b"|");
    hasher.update(policy_id.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical_json(payload).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Filters for listing violations
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub connection_name: Option<String>,
    pub policy_id: Option<String>,
    pub status: Option<ViolationStatus>,
    pub severity: Option<Severity>,
}

#[derive(Default)]
struct LedgerState {
    violations: HashMap<Uuid, Violation>,
    by_fingerprint: HashMap<String, Uuid>,
}

/// Thread-safe violation ledger
pub struct ViolationLedger {
    // One lock over both maps keeps upsert atomic per fingerprint
    state: RwLock<LedgerState>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Insert or refresh a violation, keyed by its fingerprint
    pub async fn upsert(&self, violation: Violation) -> Result<UpsertOutcome, GovernanceError> {
        let mut state = self.state.write().await;

        let Some(existing_id) = state.by_fingerprint.get(&violation.fingerprint).copied() else {
            let mut violation = violation;
            violation.status = ViolationStatus::Open;
            violation.resolved_at = None;
            violation.resolved_by = None;
            state
                .by_fingerprint
                .insert(violation.fingerprint.clone(), violation.violation_id);
            debug!(
                "Recorded violation {} for '{}' / policy '{}'",
                violation.violation_id, violation.connection_name, violation.policy_id
            );
            state.violations.insert(violation.violation_id, violation);
            return Ok(UpsertOutcome::Created);
        };

        let Some(existing) = state.violations.get_mut(&existing_id) else {
            return Err(GovernanceError::Persistence(format!(
                "fingerprint index points at missing violation {}",
                existing_id
            )));
        };

        match existing.status {
            ViolationStatus::Open | ViolationStatus::InProgress => {
                existing.detected_at = Utc::now();
                Ok(UpsertOutcome::Confirmed)
            }
            ViolationStatus::Resolved => {
                existing.status = ViolationStatus::Open;
                existing.detected_at = Utc::now();
                existing.resolved_at = None;
                existing.resolved_by = None;
                debug!(
                    "Reopened violation {} for '{}' (regression)",
                    existing.violation_id, existing.connection_name
                );
                Ok(UpsertOutcome::Reopened)
            }
            ViolationStatus::Ignored => Ok(UpsertOutcome::Suppressed),
        }
    }

    /// Transition a violation's lifecycle status
    pub async fn transition(
        &self,
        violation_id: Uuid,
        new_status: ViolationStatus,
        actor: &str,
    ) -> Result<Violation, GovernanceError> {
        let mut state = self.state.write().await;
        let violation = state.violations.get_mut(&violation_id).ok_or_else(|| {
            GovernanceError::NotFound(format!("violation {} not found", violation_id))
        })?;

        let legal = matches!(
            (violation.status, new_status),
            (ViolationStatus::Open, ViolationStatus::InProgress)
                | (ViolationStatus::InProgress, ViolationStatus::Resolved)
                | (ViolationStatus::Open, ViolationStatus::Resolved)
                | (ViolationStatus::Open, ViolationStatus::Ignored)
                | (ViolationStatus::InProgress, ViolationStatus::Ignored)
        );
        if !legal {
            return Err(GovernanceError::InvalidTransition(format!(
                "violation {} cannot move {:?} -> {:?}",
                violation_id, violation.status, new_status
            )));
        }

        violation.status = new_status;
        if new_status == ViolationStatus::Resolved {
            violation.resolved_at = Some(Utc::now());
            violation.resolved_by = Some(actor.to_string());
        }
        Ok(violation.clone())
    }

    /// Get a violation by id
    pub async fn get(&self, violation_id: Uuid) -> Result<Violation, GovernanceError> {
        let state = self.state.read().await;
        state
            .violations
            .get(&violation_id)
            .cloned()
            .ok_or_else(|| GovernanceError::NotFound(format!("violation {} not found", violation_id)))
    }

    /// List violations matching the filter, most recently detected first
    pub async fn list(&self, filter: &ViolationFilter) -> Vec<Violation> {
        let state = self.state.read().await;
        let mut matches: Vec<Violation> = state
            .violations
            .values()
            .filter(|v| {
                filter
                    .connection_name
                    .as_ref()
                    .map_or(true, |name| &v.connection_name == name)
                    && filter
                        .policy_id
                        .as_ref()
                        .map_or(true, |id| &v.policy_id == id)
                    && filter.status.map_or(true, |s| v.status == s)
                    && filter.severity.map_or(true, |s| v.severity == s)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        matches
    }

    /// Open violation counts per connection (dashboard surface)
    pub async fn open_count_by_connection(&self) -> HashMap<String, usize> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for violation in state.violations.values() {
            if violation.status == ViolationStatus::Open {
                *counts.entry(violation.connection_name.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Get violation count
    pub async fn count(&self) -> usize {
        let state = self.state.read().await;
        state.violations.len()
    }
}

impl Default for ViolationLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn violation(connection: &str, policy: &str, payload: Value) -> Violation {
        Violation {
            violation_id: Uuid::new_v4(),
            connection_name: connection.to_string(),
            policy_id: policy.to_string(),
            severity: Severity::Medium,
            description: "test violation".to_string(),
            detected_at: Utc::now(),
            violation_data: payload.clone(),
            remediation_suggested: vec![],
            status: ViolationStatus::Open,
            resolved_at: None,
            resolved_by: None,
            fingerprint: fingerprint(connection, policy, &payload),
        }
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = json!({"table": "orders", "fkCount": 0});
        let b = json!({"fkCount": 0, "table": "orders"});
        assert_eq!(fingerprint("db", "p", &a), fingerprint("db", "p", &b));
    }

    #[test]
    fn test_fingerprint_separates_connections_and_policies() {
        let payload = json!({"table": "orders"});
        let base = fingerprint("db1", "p1", &payload);
        assert_ne!(base, fingerprint("db2", "p1", &payload));
        assert_ne!(base, fingerprint("db1", "p2", &payload));
        assert_ne!(base, fingerprint("db1", "p1", &json!({"table": "users"})));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let ledger = ViolationLedger::new();
        let payload = json!({"table": "orders"});

        let first = ledger.upsert(violation("db", "p", payload.clone())).await.unwrap();
        assert_eq!(first, UpsertOutcome::Created);

        let second = ledger.upsert(violation("db", "p", payload)).await.unwrap();
        assert_eq!(second, UpsertOutcome::Confirmed);

        assert_eq!(ledger.count().await, 1);
    }

    #[tokio::test]
    async fn test_confirm_refreshes_detected_at() {
        let ledger = ViolationLedger::new();
        let payload = json!({"table": "orders"});

        ledger.upsert(violation("db", "p", payload.clone())).await.unwrap();
        let before = ledger.list(&ViolationFilter::default()).await[0].detected_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ledger.upsert(violation("db", "p", payload)).await.unwrap();
        let after = ledger.list(&ViolationFilter::default()).await[0].detected_at;

        assert!(after > before);
    }

    #[tokio::test]
    async fn test_reopen_after_resolution() {
        let ledger = ViolationLedger::new();
        let payload = json!({"table": "orders"});

        ledger.upsert(violation("db", "p", payload.clone())).await.unwrap();
        let stored = ledger.list(&ViolationFilter::default()).await.remove(0);

        ledger
            .transition(stored.violation_id, ViolationStatus::Resolved, "dba")
            .await
            .unwrap();
        let resolved = ledger.get(stored.violation_id).await.unwrap();
        assert_eq!(resolved.resolved_by.as_deref(), Some("dba"));
        assert!(resolved.resolved_at.is_some());

        let outcome = ledger.upsert(violation("db", "p", payload)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Reopened);

        let reopened = ledger.get(stored.violation_id).await.unwrap();
        assert_eq!(reopened.status, ViolationStatus::Open);
        assert!(reopened.resolved_at.is_none());
        assert!(reopened.resolved_by.is_none());
        assert!(reopened.detected_at > stored.detected_at);
    }

    #[tokio::test]
    async fn test_ignored_violations_suppress_upserts() {
        let ledger = ViolationLedger::new();
        let payload = json!({"table": "orders"});

        ledger.upsert(violation("db", "p", payload.clone())).await.unwrap();
        let stored = ledger.list(&ViolationFilter::default()).await.remove(0);
        ledger
            .transition(stored.violation_id, ViolationStatus::Ignored, "dba")
            .await
            .unwrap();

        let outcome = ledger.upsert(violation("db", "p", payload)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Suppressed);
        assert_eq!(
            ledger.get(stored.violation_id).await.unwrap().status,
            ViolationStatus::Ignored
        );
    }

    #[tokio::test]
    async fn test_illegal_transitions_are_rejected() {
        let ledger = ViolationLedger::new();
        ledger
            .upsert(violation("db", "p", json!({"k": 1})))
            .await
            .unwrap();
        let stored = ledger.list(&ViolationFilter::default()).await.remove(0);

        // resolved -> in_progress is not legal
        ledger
            .transition(stored.violation_id, ViolationStatus::Resolved, "dba")
            .await
            .unwrap();
        let err = ledger
            .transition(stored.violation_id, ViolationStatus::InProgress, "dba")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GovernanceError::InvalidTransition(_)));

        // unknown id
        let err = ledger
            .transition(Uuid::new_v4(), ViolationStatus::Resolved, "dba")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GovernanceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let ledger = ViolationLedger::new();
        ledger
            .upsert(violation("db1", "p1", json!({"k": 1})))
            .await
            .unwrap();
        ledger
            .upsert(violation("db2", "p1", json!({"k": 2})))
            .await
            .unwrap();

        let filter = ViolationFilter {
            connection_name: Some("db1".to_string()),
            ..ViolationFilter::default()
        };
        let matched = ledger.list(&filter).await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].connection_name, "db1");

        let counts = ledger.open_count_by_connection().await;
        assert_eq!(counts.get("db1"), Some(&1));
        assert_eq!(counts.get("db2"), Some(&1));
    }
}
