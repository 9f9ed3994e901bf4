//! Governance Engine
//!
//! Orchestrates policy evaluation: pulls active connections from the
//! registry, inspects each target once, runs the applicable policies through
//! the matching rule evaluator, and turns threshold-clearing findings into
//! deduplicated violations plus audit events.
//!
//! Connections are evaluated concurrently up to a worker limit; policies
//! within one connection run sequentially so the per-connection summary
//! audit event is always last.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEmitter, AuditEvent};
use crate::config::EngineConfig;
use crate::evaluator::{evaluator_for, Finding, Severity};
use crate::ledger::{fingerprint, UpsertOutcome, Violation, ViolationLedger, ViolationStatus};
use crate::policy::{Policy, PolicyStore};
use crate::registry::{Connection, ConnectionStatus, ConnectorRegistry};

const AUDIT_SOURCE: &str = "governance_engine";

/// State machine for one connection evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    Pending,
    Evaluating,
    Completed,
    Failed,
}

/// Upsert outcome counts for one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationCounts {
    pub created: usize,
    pub confirmed: usize,
    pub reopened: usize,
    pub suppressed: usize,
}

impl ViolationCounts {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Confirmed => self.confirmed += 1,
            UpsertOutcome::Reopened => self.reopened += 1,
            UpsertOutcome::Suppressed => self.suppressed += 1,
        }
    }

    fn add(&mut self, other: ViolationCounts) {
        self.created += other.created;
        self.confirmed += other.confirmed;
        self.reopened += other.reopened;
        self.suppressed += other.suppressed;
    }

    /// Findings that were flagged as (new or still-open) violations
    pub fn flagged(&self) -> usize {
        self.created + self.confirmed + self.reopened
    }
}

/// Per-connection evaluation report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub connection_name: String,
    pub state: EvaluationState,
    pub policies_evaluated: usize,
    pub findings: usize,
    pub evaluation_errors: usize,
    pub violations: ViolationCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionReport {
    fn new(connection: &Connection) -> Self {
        Self {
            connection_name: connection.name.clone(),
            state: EvaluationState::Pending,
            policies_evaluated: 0,
            findings: 0,
            evaluation_errors: 0,
            violations: ViolationCounts::default(),
            error: None,
        }
    }
}

/// Summary of one `evaluate_all` run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub evaluated: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub violations: ViolationCounts,
    pub compliance_score: f64,
    pub reports: Vec<ConnectionReport>,
}

/// The governance engine
pub struct GovernanceEngine {
    policies: Arc<PolicyStore>,
    registry: Arc<ConnectorRegistry>,
    ledger: Arc<ViolationLedger>,
    audit: Arc<AuditEmitter>,
    limiter: Arc<Semaphore>,
    evaluator_timeout: Duration,
    cancelled: AtomicBool,
}

impl GovernanceEngine {
    pub fn new(
        policies: Arc<PolicyStore>,
        registry: Arc<ConnectorRegistry>,
        ledger: Arc<ViolationLedger>,
        audit: Arc<AuditEmitter>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            policies,
            registry,
            ledger,
            audit,
            limiter: Arc::new(Semaphore::new(config.worker_limit.max(1))),
            evaluator_timeout: config.evaluator_timeout(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Request cooperative cancellation of the in-flight run: evaluations
    /// already underway finish, not-yet-started ones are skipped.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        info!("Evaluation run cancellation requested");
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Evaluate every active connection, isolating failures per connection
    pub async fn evaluate_all(self: Arc<Self>) -> RunSummary {
        self.cancelled.store(false, Ordering::SeqCst);

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let connections = self.registry.list_active().await;
        info!(
            "Starting evaluation run {} over {} active connections",
            run_id,
            connections.len()
        );

        let mut tasks: JoinSet<ConnectionReport> = JoinSet::new();
        for connection in connections.iter().cloned() {
            let engine = self.clone();
            tasks.spawn(async move {
                let permit = engine.limiter.clone().acquire_owned().await;
                if permit.is_err() || engine.is_cancelled() {
                    debug!(
                        "Skipping evaluation of '{}' (run cancelled)",
                        connection.name
                    );
                    return ConnectionReport::new(&connection);
                }
                engine.evaluate_connection(&connection).await
            });
        }

        let mut summary = RunSummary {
            run_id,
            started_at,
            finished_at: started_at,
            evaluated: connections.len(),
            completed: 0,
            failed: 0,
            skipped: 0,
            violations: ViolationCounts::default(),
            compliance_score: 100.0,
            reports: Vec::with_capacity(connections.len()),
        };

        let mut total_checks = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    match report.state {
                        EvaluationState::Completed => summary.completed += 1,
                        EvaluationState::Failed => summary.failed += 1,
                        // Never left Pending: the task was skipped by cancellation
                        _ => summary.skipped += 1,
                    }
                    total_checks += report.policies_evaluated;
                    summary.violations.add(report.violations);
                    summary.reports.push(report);
                }
                Err(e) => {
                    error!("Evaluation task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }
        summary
            .reports
            .sort_by(|a, b| a.connection_name.cmp(&b.connection_name));

        summary.compliance_score = if total_checks == 0 {
            100.0
        } else {
            let flagged = summary.violations.flagged().min(total_checks);
            (total_checks - flagged) as f64 / total_checks as f64 * 100.0
        };
        summary.finished_at = Utc::now();

        self.emit_or_warn(
            AuditEvent::new(AUDIT_SOURCE, AuditAction::EvaluationCompleted)
                .with_target("all")
                .with_details(json!({
                    "runId": summary.run_id,
                    "evaluated": summary.evaluated,
                    "completed": summary.completed,
                    "failed": summary.failed,
                    "skipped": summary.skipped,
                    "complianceScore": summary.compliance_score,
                })),
        )
        .await;

        info!(
            "Evaluation run {} finished: {} completed, {} failed, {} skipped, score {:.1}",
            summary.run_id, summary.completed, summary.failed, summary.skipped, summary.compliance_score
        );
        summary
    }

    /// Evaluate one connection against every applicable policy
    pub async fn evaluate_connection(&self, connection: &Connection) -> ConnectionReport {
        let mut report = ConnectionReport::new(connection);
        report.state = EvaluationState::Evaluating;
        debug!("Evaluating connection '{}'", connection.name);

        let policies = self.policies.find_applicable(connection.db_type).await;

        let handle = match self.registry.handle(&connection.name).await {
            Ok(handle) => handle,
            Err(e) => {
                return self.fail_connection(report, connection, e.to_string()).await;
            }
        };

        let inspection = match tokio::time::timeout(self.evaluator_timeout, handle.inspect()).await
        {
            Ok(Ok(inspection)) => inspection,
            Ok(Err(e)) => {
                return self
                    .fail_connection(report, connection, format!("connector unavailable: {}", e))
                    .await;
            }
            Err(_) => {
                return self
                    .fail_connection(
                        report,
                        connection,
                        format!(
                            "inspection timed out after {}s",
                            self.evaluator_timeout.as_secs()
                        ),
                    )
                    .await;
            }
        };

        let evaluator = evaluator_for(connection.db_type);
        for policy in &policies {
            report.policies_evaluated += 1;

            let findings = match evaluator.evaluate(connection, policy, &inspection) {
                Ok(findings) => findings,
                Err(e) => {
                    warn!(
                        "Policy '{}' failed against '{}': {}",
                        policy.policy_id, connection.name, e
                    );
                    report.evaluation_errors += 1;
                    vec![Finding {
                        rule: "evaluation_error".to_string(),
                        severity: Severity::High,
                        description: format!("policy evaluation failed: {}", e),
                        payload: json!({ "error": e.to_string() }),
                        remediation: vec![
                            "Check database connectivity".to_string(),
                            "Verify policy configuration".to_string(),
                        ],
                    }]
                }
            };

            for finding in findings {
                report.findings += 1;
                if finding.severity < policy.enforcement_level.severity_floor() {
                    continue;
                }

                let violation = build_violation(connection, policy, finding);
                let violation_id = violation.violation_id;
                let severity = violation.severity;
                match self.ledger.upsert(violation).await {
                    Ok(outcome) => {
                        report.violations.record(outcome);
                        if let Some(action) = audit_action_for(outcome) {
                            let mut event = AuditEvent::new(AUDIT_SOURCE, action)
                                .with_target(&connection.name)
                                .with_details(json!({
                                    "policyId": policy.policy_id,
                                    "violationId": violation_id,
                                    "severity": severity,
                                }));
                            if let Some(framework) = policy.compliance_frameworks.first() {
                                event = event.with_framework(framework);
                            }
                            self.emit_or_warn(event).await;
                        }
                    }
                    Err(e) => {
                        error!(
                            "Failed to record violation for '{}' / '{}': {}",
                            connection.name, policy.policy_id, e
                        );
                    }
                }
            }
        }

        report.state = EvaluationState::Completed;
        self.emit_or_warn(
            AuditEvent::new(AUDIT_SOURCE, AuditAction::EvaluationCompleted)
                .with_target(&connection.name)
                .with_details(json!({
                    "policies": report.policies_evaluated,
                    "findings": report.findings,
                    "created": report.violations.created,
                    "confirmed": report.violations.confirmed,
                    "reopened": report.violations.reopened,
                    "suppressed": report.violations.suppressed,
                    "errors": report.evaluation_errors,
                })),
        )
        .await;

        debug!(
            "Connection '{}' evaluated: {} findings, {} flagged",
            connection.name,
            report.findings,
            report.violations.flagged()
        );
        report
    }

    /// Connector failure path: mark the connection, record the error, and
    /// close the evaluation with a summary event.
    async fn fail_connection(
        &self,
        mut report: ConnectionReport,
        connection: &Connection,
        reason: String,
    ) -> ConnectionReport {
        warn!("Evaluation of '{}' failed: {}", connection.name, reason);

        if let Err(e) = self
            .registry
            .mark_status(&connection.name, ConnectionStatus::Error)
            .await
        {
            // The connection may have been deregistered or deactivated mid-run
            debug!("Could not mark '{}' as error: {}", connection.name, e);
        }

        report.state = EvaluationState::Failed;
        report.error = Some(reason.clone());

        self.emit_or_warn(
            AuditEvent::new(AUDIT_SOURCE, AuditAction::EvaluationCompleted)
                .with_target(&connection.name)
                .with_details(json!({
                    "policies": report.policies_evaluated,
                    "findings": report.findings,
                    "errors": 1,
                    "error": reason,
                })),
        )
        .await;
        report
    }

    /// No evaluation outcome is lost to an audit outage, but emission
    /// failures must not abort the evaluation either.
    async fn emit_or_warn(&self, event: AuditEvent) {
        if let Err(e) = self.audit.emit(event).await {
            error!("Audit emission failed: {}", e);
        }
    }
}

fn build_violation(connection: &Connection, policy: &Policy, finding: Finding) -> Violation {
    let fingerprint = fingerprint(&connection.name, &policy.policy_id, &finding.payload);
    Violation {
        violation_id: Uuid::new_v4(),
        connection_name: connection.name.clone(),
        policy_id: policy.policy_id.clone(),
        severity: finding.severity,
        description: finding.description,
        detected_at: Utc::now(),
        violation_data: finding.payload,
        remediation_suggested: finding.remediation,
        status: ViolationStatus::Open,
        resolved_at: None,
        resolved_by: None,
        fingerprint,
    }
}

fn audit_action_for(outcome: UpsertOutcome) -> Option<AuditAction> {
    match outcome {
        UpsertOutcome::Created | UpsertOutcome::Reopened => Some(AuditAction::ViolationDetected),
        UpsertOutcome::Confirmed => Some(AuditAction::ViolationConfirmed),
        // Ignored violations stay silent
        UpsertOutcome::Suppressed => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        Connector, ConnectorError, DbType, HealthReport, MemoryConnector, TableStats,
        TargetInspection,
    };
    use crate::policy::seed_default_policies;
    use crate::registry::Environment;
    use crate::ledger::ViolationFilter;
    use async_trait::async_trait;

    fn connection(name: &str, db_type: DbType) -> Connection {
        Connection {
            name: name.to_string(),
            db_type,
            module_name: "orders-service".to_string(),
            environment: Environment::Development,
            governance_policies: vec![],
            compliance_frameworks: vec![],
            status: ConnectionStatus::Active,
            last_health_check: None,
            created_at: Utc::now(),
        }
    }

    struct Harness {
        policies: Arc<PolicyStore>,
        registry: Arc<ConnectorRegistry>,
        ledger: Arc<ViolationLedger>,
        audit: Arc<AuditEmitter>,
        engine: Arc<GovernanceEngine>,
    }

    async fn harness(worker_limit: usize) -> Harness {
        let policies = Arc::new(PolicyStore::new());
        let registry = Arc::new(ConnectorRegistry::new());
        let ledger = Arc::new(ViolationLedger::new());
        let audit = Arc::new(AuditEmitter::in_memory());
        seed_default_policies(&policies, &audit).await.unwrap();

        let config = EngineConfig {
            worker_limit,
            evaluator_timeout_secs: 2,
            ..EngineConfig::default()
        };
        let engine = Arc::new(GovernanceEngine::new(
            policies.clone(),
            registry.clone(),
            ledger.clone(),
            audit.clone(),
            &config,
        ));
        Harness {
            policies,
            registry,
            ledger,
            audit,
            engine,
        }
    }

    fn pg_inspection_missing_fk() -> TargetInspection {
        TargetInspection {
            tables: Some(vec![TableStats {
                name: "orders".to_string(),
                column_count: 6,
                foreign_key_count: 0,
                ..TableStats::default()
            }]),
            ..TargetInspection::empty()
        }
    }

    /// Connector whose inspection takes long enough to cancel around
    struct SlowConnector {
        db_type: DbType,
        delay: Duration,
    }

    #[async_trait]
    impl Connector for SlowConnector {
        fn db_type(&self) -> DbType {
            self.db_type
        }

        async fn health_check(&self) -> Result<HealthReport, ConnectorError> {
            Ok(HealthReport {
                healthy: true,
                latency_ms: 0,
                detail: None,
            })
        }

        async fn inspect(&self) -> Result<TargetInspection, ConnectorError> {
            tokio::time::sleep(self.delay).await;
            Ok(TargetInspection::baseline(self.db_type))
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_missing_foreign_key_creates_violation_and_audit_event() {
        let h = harness(2).await;
        let handle = Arc::new(MemoryConnector::with_inspection(
            DbType::Postgresql,
            pg_inspection_missing_fk(),
        ));
        let conn = h
            .registry
            .register(connection("pg_main", DbType::Postgresql), handle)
            .await
            .unwrap();

        let report = h.engine.evaluate_connection(&conn).await;

        assert_eq!(report.state, EvaluationState::Completed);
        // blocking policy + cross-type data quality apply; only the FK rule fires
        assert_eq!(report.policies_evaluated, 2);
        assert_eq!(report.violations.created, 1);

        let stored = h.ledger.list(&ViolationFilter::default()).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].policy_id, "postgresql_referential_integrity");
        assert_eq!(stored[0].severity, Severity::High);

        let events = h.audit.recent(10).await.unwrap();
        // summary event is last, hence first in the recent (reversed) view
        assert_eq!(events[0].action, AuditAction::EvaluationCompleted);
        assert!(events
            .iter()
            .any(|e| e.action == AuditAction::ViolationDetected));
    }

    #[tokio::test]
    async fn test_re_evaluation_confirms_instead_of_duplicating() {
        let h = harness(2).await;
        let handle = Arc::new(MemoryConnector::with_inspection(
            DbType::Postgresql,
            pg_inspection_missing_fk(),
        ));
        let conn = h
            .registry
            .register(connection("pg_main", DbType::Postgresql), handle)
            .await
            .unwrap();

        let first = h.engine.evaluate_connection(&conn).await;
        assert_eq!(first.violations.created, 1);

        let second = h.engine.evaluate_connection(&conn).await;
        assert_eq!(second.violations.created, 0);
        assert_eq!(second.violations.confirmed, 1);

        assert_eq!(h.ledger.count().await, 1);
        let events = h.audit.recent(20).await.unwrap();
        assert!(events
            .iter()
            .any(|e| e.action == AuditAction::ViolationConfirmed));
    }

    #[tokio::test]
    async fn test_redis_with_no_memory_data_yields_no_violations() {
        let h = harness(2).await;
        let handle = Arc::new(MemoryConnector::new(DbType::Redis));
        let conn = h
            .registry
            .register(connection("cache", DbType::Redis), handle)
            .await
            .unwrap();

        let report = h.engine.evaluate_connection(&conn).await;

        assert_eq!(report.state, EvaluationState::Completed);
        assert_eq!(report.findings, 0);
        assert_eq!(h.ledger.count().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_connector_isolates_one_connection() {
        let h = harness(2).await;

        let broken = Arc::new(MemoryConnector::new(DbType::Postgresql));
        broken.set_healthy(false);
        h.registry
            .register(connection("pg_broken", DbType::Postgresql), broken)
            .await
            .unwrap();

        let healthy = Arc::new(MemoryConnector::with_inspection(
            DbType::Postgresql,
            pg_inspection_missing_fk(),
        ));
        h.registry
            .register(connection("pg_ok", DbType::Postgresql), healthy)
            .await
            .unwrap();

        let summary = h.engine.clone().evaluate_all().await;

        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.violations.created, 1);

        // failed connection was marked error by the engine
        assert_eq!(
            h.registry.get("pg_broken").await.unwrap().status,
            ConnectionStatus::Error
        );
        // healthy connection still produced its violation
        let stored = h.ledger.list(&ViolationFilter::default()).await;
        assert_eq!(stored[0].connection_name, "pg_ok");

        let failed = summary
            .reports
            .iter()
            .find(|r| r.connection_name == "pg_broken")
            .unwrap();
        assert_eq!(failed.state, EvaluationState::Failed);
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn test_enforcement_threshold_filters_low_findings() {
        let h = harness(2).await;

        // Index-coverage findings are low severity; the error-level mongodb
        // policy must not flag them, so no violation is stored.
        let inspection = TargetInspection {
            collections: Some(vec![crate::connector::CollectionStats {
                name: "events".to_string(),
                has_validator: true,
                index_count: 1,
                ..crate::connector::CollectionStats::default()
            }]),
            ..TargetInspection::empty()
        };
        let handle = Arc::new(MemoryConnector::with_inspection(DbType::Mongodb, inspection));
        let conn = h
            .registry
            .register(connection("docs", DbType::Mongodb), handle)
            .await
            .unwrap();

        let report = h.engine.evaluate_connection(&conn).await;

        assert_eq!(report.findings, 1);
        assert_eq!(report.violations.flagged(), 0);
        assert_eq!(h.ledger.count().await, 0);
    }

    #[tokio::test]
    async fn test_policies_evaluated_in_enforcement_order() {
        let h = harness(2).await;
        let applicable = h.policies.find_applicable(DbType::Postgresql).await;
        let ids: Vec<&str> = applicable.iter().map(|p| p.policy_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["postgresql_referential_integrity", "data_quality_standards"]
        );
    }

    #[tokio::test]
    async fn test_cancellation_skips_pending_connections() {
        let h = harness(1).await;
        for name in ["db_a", "db_b", "db_c"] {
            h.registry
                .register(
                    connection(name, DbType::Redis),
                    Arc::new(SlowConnector {
                        db_type: DbType::Redis,
                        delay: Duration::from_millis(150),
                    }),
                )
                .await
                .unwrap();
        }

        let run = tokio::spawn(h.engine.clone().evaluate_all());
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.engine.cancel();
        let summary = run.await.unwrap();

        assert_eq!(summary.evaluated, 3);
        assert!(summary.skipped >= 1, "expected skipped connections");
        assert!(summary.completed >= 1, "in-flight evaluation must finish");
        assert_eq!(summary.completed + summary.skipped, 3);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_inspection_timeout_fails_connection() {
        let h = harness(1).await;
        let conn = h
            .registry
            .register(
                connection("slowpoke", DbType::Redis),
                Arc::new(SlowConnector {
                    db_type: DbType::Redis,
                    delay: Duration::from_secs(5),
                }),
            )
            .await
            .unwrap();

        let report = h.engine.evaluate_connection(&conn).await;
        assert_eq!(report.state, EvaluationState::Failed);
        assert!(report.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(
            h.registry.get("slowpoke").await.unwrap().status,
            ConnectionStatus::Error
        );
    }
}
