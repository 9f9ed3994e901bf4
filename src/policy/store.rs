//! Policy storage
//!
//! In-memory store for governance policies, indexed by policy id.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::connector::DbType;
use crate::error::GovernanceError;
use crate::policy::Policy;

/// Thread-safe policy store
pub struct PolicyStore {
    policies: RwLock<HashMap<String, Policy>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new policy
    pub async fn register(&self, policy: Policy) -> Result<Policy, GovernanceError> {
        let policy = policy.validated()?;
        let mut policies = self.policies.write().await;
        if policies.contains_key(&policy.policy_id) {
            return Err(GovernanceError::DuplicateIdentifier(format!(
                "policy '{}' already exists",
                policy.policy_id
            )));
        }
        policies.insert(policy.policy_id.clone(), policy.clone());
        Ok(policy)
    }

    /// Get a policy by id
    pub async fn get(&self, policy_id: &str) -> Result<Policy, GovernanceError> {
        let policies = self.policies.read().await;
        policies
            .get(policy_id)
            .cloned()
            .ok_or_else(|| GovernanceError::NotFound(format!("policy '{}' not found", policy_id)))
    }

    /// All policies applicable to a database type, ordered by enforcement
    /// level descending (blocking > error > warning), ties broken by policy
    /// id ascending for determinism.
    pub async fn find_applicable(&self, db_type: DbType) -> Vec<Policy> {
        let policies = self.policies.read().await;
        let mut applicable: Vec<Policy> = policies
            .values()
            .filter(|p| p.applies_to(db_type))
            .cloned()
            .collect();
        applicable.sort_by(|a, b| {
            b.enforcement_level
                .cmp(&a.enforcement_level)
                .then_with(|| a.policy_id.cmp(&b.policy_id))
        });
        applicable
    }

    /// Replace an existing policy, bumping its update timestamp
    pub async fn update(&self, policy: Policy) -> Result<Policy, GovernanceError> {
        let mut policy = policy.validated()?;
        let mut policies = self.policies.write().await;
        let existing = policies.get(&policy.policy_id).ok_or_else(|| {
            GovernanceError::NotFound(format!("policy '{}' not found", policy.policy_id))
        })?;
        policy.created_at = existing.created_at;
        policy.updated_at = chrono::Utc::now();
        policies.insert(policy.policy_id.clone(), policy.clone());
        Ok(policy)
    }

    /// List all policies, ordered by policy id
    pub async fn list(&self) -> Vec<Policy> {
        let policies = self.policies.read().await;
        let mut all: Vec<Policy> = policies.values().cloned().collect();
        all.sort_by(|a, b| a.policy_id.cmp(&b.policy_id));
        all
    }

    /// Get policy count
    pub async fn count(&self) -> usize {
        let policies = self.policies.read().await;
        policies.len()
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}
