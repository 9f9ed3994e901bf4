//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::audit::{AuditEmitter, MemoryAuditSink};
use crate::config::Settings;
use crate::engine::GovernanceEngine;
use crate::ledger::ViolationLedger;
use crate::policy::PolicyStore;
use crate::registry::ConnectorRegistry;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Loaded settings
    pub settings: Settings,

    /// Governance policy store
    pub policies: Arc<PolicyStore>,

    /// Registry of governed connections and their live handles
    pub registry: Arc<ConnectorRegistry>,

    /// Violation ledger
    pub ledger: Arc<ViolationLedger>,

    /// Audit emitter (has internal retry)
    pub audit: Arc<AuditEmitter>,

    /// Governance evaluation engine
    pub engine: Arc<GovernanceEngine>,
}

impl AppState {
    /// Create new application state from loaded settings
    pub fn new(settings: Settings) -> Self {
        let policies = Arc::new(PolicyStore::new());
        let registry = Arc::new(ConnectorRegistry::new());
        let ledger = Arc::new(ViolationLedger::new());
        let audit = Arc::new(AuditEmitter::new(
            Arc::new(MemoryAuditSink::new()),
            settings.audit.clone(),
        ));
        let engine = Arc::new(GovernanceEngine::new(
            policies.clone(),
            registry.clone(),
            ledger.clone(),
            audit.clone(),
            &settings.engine,
        ));

        Self {
            settings,
            policies,
            registry,
            ledger,
            audit,
            engine,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
