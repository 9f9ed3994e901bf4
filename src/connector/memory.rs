//! In-process connector
//!
//! Backed by a static inspection snapshot. Used for development environments
//! and integration tests where no live target is reachable; the snapshot can
//! be swapped at runtime to simulate target drift.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{Connector, ConnectorError, DbType, HealthReport, TargetInspection};

pub struct MemoryConnector {
    db_type: DbType,
    inspection: RwLock<TargetInspection>,
    healthy: AtomicBool,
}

impl MemoryConnector {
    /// Create a connector reporting the baseline (empty) inspection for its type
    pub fn new(db_type: DbType) -> Self {
        Self::with_inspection(db_type, TargetInspection::baseline(db_type))
    }

    /// Create a connector reporting a fixed inspection snapshot
    pub fn with_inspection(db_type: DbType, inspection: TargetInspection) -> Self {
        Self {
            db_type,
            inspection: RwLock::new(inspection),
            healthy: AtomicBool::new(true),
        }
    }

    /// Replace the inspection snapshot this connector reports
    pub async fn set_inspection(&self, inspection: TargetInspection) {
        *self.inspection.write().await = inspection;
    }

    /// Toggle the health state reported by this connector
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    async fn health_check(&self) -> Result<HealthReport, ConnectorError> {
        Ok(HealthReport {
            healthy: self.healthy.load(Ordering::SeqCst),
            latency_ms: 0,
            detail: None,
        })
    }

    async fn inspect(&self) -> Result<TargetInspection, ConnectorError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(ConnectorError::Unavailable(
                "memory connector marked unhealthy".to_string(),
            ));
        }
        Ok(self.inspection.read().await.clone())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::KeyspaceStats;

    #[tokio::test]
    async fn test_reports_configured_snapshot() {
        let connector = MemoryConnector::new(DbType::Redis);

        let mut inspection = TargetInspection::baseline(DbType::Redis);
        inspection.keyspace = Some(KeyspaceStats {
            used_memory_mb: Some(2048.0),
            sampled_keys: 10,
            ..KeyspaceStats::default()
        });
        connector.set_inspection(inspection).await;

        let seen = connector.inspect().await.unwrap();
        assert_eq!(seen.keyspace.unwrap().used_memory_mb, Some(2048.0));
    }

    #[tokio::test]
    async fn test_unhealthy_connector_fails_inspection() {
        let connector = MemoryConnector::new(DbType::Mongodb);
        connector.set_healthy(false);

        assert!(!connector.health_check().await.unwrap().healthy);
        assert!(matches!(
            connector.inspect().await,
            Err(ConnectorError::Unavailable(_))
        ));
    }
}
