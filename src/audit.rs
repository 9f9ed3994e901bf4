//! Audit Emitter
//!
//! Append-only audit trail for every state-changing governance action.
//! Events flow through a pluggable sink; appends are retried with bounded
//! exponential backoff before a persistence error is surfaced.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::error::GovernanceError;

/// Actions recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Connection lifecycle
    DatabaseRegistered,
    DatabaseDeregistered,
    ConnectionStatusChanged,

    // Policy lifecycle
    PolicyRegistered,
    PolicyUpdated,
    PoliciesSeeded,

    // Evaluation outcomes
    ViolationDetected,
    ViolationConfirmed,
    ViolationStatusChanged,
    EvaluationCompleted,
}

/// An immutable audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_framework: Option<String>,
}

impl AuditEvent {
    /// New governance event from the given source component
    pub fn new(source: impl Into<String>, action: AuditAction) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: "governance".to_string(),
            timestamp: Utc::now(),
            source: source.into(),
            action,
            actor: None,
            target: None,
            details: None,
            compliance_framework: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.compliance_framework = Some(framework.into());
        self
    }

    fn validate(&self) -> Result<(), GovernanceError> {
        if self.event_id.is_nil() {
            return Err(GovernanceError::InvalidEvent(
                "event_id must not be nil".to_string(),
            ));
        }
        if self.event_type.trim().is_empty() {
            return Err(GovernanceError::InvalidEvent(
                "event_type must not be empty".to_string(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(GovernanceError::InvalidEvent(
                "source must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event; must not reorder or drop previously appended events
    async fn append(&self, event: &AuditEvent) -> Result<(), GovernanceError>;

    /// Most recent events first, up to `limit`
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, GovernanceError>;
}

/// In-process sink holding the trail in memory
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), GovernanceError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, GovernanceError> {
        let events = self.events.read().await;
        Ok(events.iter().rev().take(limit).cloned().collect())
    }
}

/// Audit emitter with at-least-once append semantics
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
    config: AuditConfig,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        Self { sink, config }
    }

    /// Emitter over an in-memory sink with default retry settings
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAuditSink::new()), AuditConfig::default())
    }

    /// Validate and append an event, retrying transient sink failures
    pub async fn emit(&self, event: AuditEvent) -> Result<(), GovernanceError> {
        event.validate()?;

        let mut attempt = 0u32;
        loop {
            match self.sink.append(&event).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.config.retry_attempts {
                        return Err(GovernanceError::Persistence(format!(
                            "audit append failed after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Audit append failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Most recent events first, up to `limit`
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, GovernanceError> {
        self.sink.recent(limit).await
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .retry_base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.config.retry_max_delay_ms);
        // Up to 25% jitter so concurrent retries do not stampede the sink
        let jitter = rand::thread_rng().gen_range(0..=exp / 4 + 1);
        Duration::from_millis(exp + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Sink that fails the first `failures` appends
    struct FlakySink {
        inner: MemoryAuditSink,
        failures: AtomicU32,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryAuditSink::new(),
                failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl AuditSink for FlakySink {
        async fn append(&self, event: &AuditEvent) -> Result<(), GovernanceError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(GovernanceError::Persistence("sink offline".to_string()));
            }
            self.inner.append(event).await
        }

        async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, GovernanceError> {
            self.inner.recent(limit).await
        }
    }

    fn fast_retry(attempts: u32) -> AuditConfig {
        AuditConfig {
            retry_attempts: attempts,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_emit_appends_and_lists_most_recent_first() {
        let emitter = AuditEmitter::in_memory();

        emitter
            .emit(AuditEvent::new("engine", AuditAction::ViolationDetected))
            .await
            .unwrap();
        emitter
            .emit(AuditEvent::new("engine", AuditAction::EvaluationCompleted))
            .await
            .unwrap();

        let recent = emitter.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, AuditAction::EvaluationCompleted);
        assert_eq!(recent[1].action, AuditAction::ViolationDetected);
    }

    #[tokio::test]
    async fn test_emit_rejects_invalid_events() {
        let emitter = AuditEmitter::in_memory();

        let mut event = AuditEvent::new("engine", AuditAction::ViolationDetected);
        event.source = String::new();
        assert!(matches!(
            emitter.emit(event).await,
            Err(GovernanceError::InvalidEvent(_))
        ));

        let mut event = AuditEvent::new("engine", AuditAction::ViolationDetected);
        event.event_id = Uuid::nil();
        assert!(matches!(
            emitter.emit(event).await,
            Err(GovernanceError::InvalidEvent(_))
        ));

        assert!(emitter.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_emit_retries_transient_failures() {
        let emitter = AuditEmitter::new(Arc::new(FlakySink::new(2)), fast_retry(5));

        emitter
            .emit(AuditEvent::new("ledger", AuditAction::ViolationConfirmed))
            .await
            .unwrap();

        assert_eq!(emitter.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_emit_surfaces_persistence_error_on_exhaustion() {
        let emitter = AuditEmitter::new(Arc::new(FlakySink::new(10)), fast_retry(3));

        let err = emitter
            .emit(AuditEvent::new("ledger", AuditAction::ViolationConfirmed))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GovernanceError::Persistence(_)));
    }
}
