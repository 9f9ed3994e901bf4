//! Database Connector Interface
//!
//! Uniform async interface over the storage engines under governance.
//! The engine never talks a storage-specific protocol directly; everything
//! it learns about a target comes back as a [`TargetInspection`].

mod memory;
mod postgres;

pub use memory::MemoryConnector;
pub use postgres::PostgresConnector;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Database type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    Mongodb,
    Postgresql,
    Redis,
    CosmosDb,
    BlobStorage,
}

impl DbType {
    pub const ALL: [DbType; 5] = [
        DbType::Mongodb,
        DbType::Postgresql,
        DbType::Redis,
        DbType::CosmosDb,
        DbType::BlobStorage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Mongodb => "mongodb",
            DbType::Postgresql => "postgresql",
            DbType::Redis => "redis",
            DbType::CosmosDb => "cosmos_db",
            DbType::BlobStorage => "blob_storage",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connector-level error type
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("target unavailable: {0}")]
    Unavailable(String),

    #[error("inspection failed: {0}")]
    Inspection(String),

    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),
}

/// Result of a single health probe
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Per-collection statistics reported by document-store connectors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub name: String,
    pub has_validator: bool,
    pub index_count: usize,
    pub document_count: u64,
    pub avg_fields_per_document: Option<f64>,
    pub missing_required_count: Option<u64>,
    pub format_anomaly_count: Option<u64>,
    pub duplicate_count: Option<u64>,
    pub stale_document_count: Option<u64>,
}

/// Per-table statistics reported by relational connectors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub name: String,
    pub column_count: usize,
    pub foreign_key_count: usize,
    pub null_in_not_null_count: Option<u64>,
    pub orphaned_row_count: Option<u64>,
    pub invalid_constraint_count: Option<u64>,
    pub duplicate_row_count: Option<u64>,
    pub stale_row_count: Option<u64>,
    pub format_anomaly_count: Option<u64>,
}

/// Keyspace-level statistics reported by key-value connectors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyspaceStats {
    pub used_memory_mb: Option<f64>,
    pub sampled_keys: u64,
    pub keys_without_ttl: Option<u64>,
    pub key_samples: Vec<String>,
    pub oversized_value_count: Option<u64>,
    pub stale_key_count: Option<u64>,
}

/// Per-container statistics reported by wide-column connectors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub name: String,
    pub has_partition_key: bool,
    pub provisioned_throughput: Option<i64>,
    pub document_count: u64,
    pub duplicate_count: Option<u64>,
    pub stale_document_count: Option<u64>,
}

/// Per-bucket statistics reported by object-storage connectors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketStats {
    pub name: String,
    pub public_access: bool,
    pub has_lifecycle_policy: bool,
    pub blob_count: u64,
    pub untagged_blob_count: Option<u64>,
    pub stale_blob_count: Option<u64>,
}

/// Point-in-time inspection of a governed target.
///
/// A connector fills in the section matching its database family and leaves
/// the rest `None`. Within a section, `None` fields mean the connector could
/// not measure that signal; rule evaluators treat missing data as
/// non-violating unless a policy flag explicitly requires presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInspection {
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<CollectionStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<KeyspaceStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<ContainerStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<BucketStats>>,
}

impl TargetInspection {
    /// An inspection with every section absent
    pub fn empty() -> Self {
        Self {
            captured_at: Utc::now(),
            collections: None,
            tables: None,
            keyspace: None,
            containers: None,
            buckets: None,
        }
    }

    /// Baseline inspection for a database type: the matching section is
    /// present but carries no measurements yet.
    pub fn baseline(db_type: DbType) -> Self {
        let mut inspection = Self::empty();
        match db_type {
            DbType::Mongodb => inspection.collections = Some(Vec::new()),
            DbType::Postgresql => inspection.tables = Some(Vec::new()),
            DbType::Redis => inspection.keyspace = Some(KeyspaceStats::default()),
            DbType::CosmosDb => inspection.containers = Some(Vec::new()),
            DbType::BlobStorage => inspection.buckets = Some(Vec::new()),
        }
        inspection
    }
}

/// Uniform interface to a live governed target.
///
/// Implementations must never mutate the target; `inspect` is read-only by
/// contract.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Database family this connector speaks to
    fn db_type(&self) -> DbType;

    /// Probe the target and report liveness
    async fn health_check(&self) -> Result<HealthReport, ConnectorError>;

    /// Capture a point-in-time inspection of the target
    async fn inspect(&self) -> Result<TargetInspection, ConnectorError>;

    /// Release any resources held against the target
    async fn close(&self);
}

/// Connect to a governed target, dispatching on the target scheme.
///
/// `memory://` builds an in-process connector for any database type;
/// `postgres://` / `postgresql://` builds the live relational connector.
pub async fn connect(db_type: DbType, target: &str) -> Result<Arc<dyn Connector>, ConnectorError> {
    if target.starts_with("memory://") {
        return Ok(Arc::new(MemoryConnector::new(db_type)));
    }

    if target.starts_with("postgres://") || target.starts_with("postgresql://") {
        if db_type != DbType::Postgresql {
            return Err(ConnectorError::UnsupportedTarget(format!(
                "postgres target given for db_type '{}'",
                db_type
            )));
        }
        let connector = PostgresConnector::connect(target).await?;
        return Ok(Arc::new(connector));
    }

    Err(ConnectorError::UnsupportedTarget(format!(
        "no connector driver for target '{}' (db_type '{}')",
        target, db_type
    )))
}
