//! Connector Registry
//!
//! Holds metadata and live connector handles for every database under
//! governance, and owns connection status transitions and health sweeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::connector::{Connector, DbType};
use crate::error::GovernanceError;

/// Environment classification for a governed database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Inactive,
    Error,
}

/// A registered database connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub name: String,
    pub db_type: DbType,
    pub module_name: String,
    pub environment: Environment,
    pub governance_policies: Vec<String>,
    pub compliance_frameworks: Vec<String>,
    pub status: ConnectionStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// Validate the connection's own invariants before registration
    pub fn validated(self) -> Result<Self, GovernanceError> {
        if self.name.trim().is_empty() {
            return Err(GovernanceError::Validation(
                "connection name must not be empty".to_string(),
            ));
        }
        if self.module_name.trim().is_empty() {
            return Err(GovernanceError::Validation(
                "module_name must not be empty".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Result of one health-check sweep
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSweep {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Registry of governed connections and their live handles
pub struct ConnectorRegistry {
    connections: RwLock<HashMap<String, Connection>>,
    handles: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection together with its live connector handle.
    /// The connection always enters the registry with status `active`.
    pub async fn register(
        &self,
        connection: Connection,
        handle: Arc<dyn Connector>,
    ) -> Result<Connection, GovernanceError> {
        let mut connection = connection.validated()?;
        if handle.db_type() != connection.db_type {
            return Err(GovernanceError::Validation(format!(
                "connector speaks '{}' but connection '{}' is declared '{}'",
                handle.db_type(),
                connection.name,
                connection.db_type
            )));
        }

        connection.status = ConnectionStatus::Active;
        connection.created_at = Utc::now();
        connection.last_health_check = None;

        let mut connections = self.connections.write().await;
        if connections.contains_key(&connection.name) {
            return Err(GovernanceError::DuplicateIdentifier(format!(
                "connection '{}' already registered",
                connection.name
            )));
        }
        connections.insert(connection.name.clone(), connection.clone());
        drop(connections);

        let mut handles = self.handles.write().await;
        handles.insert(connection.name.clone(), handle);
        drop(handles);

        info!(
            "Registered connection '{}' ({}, module '{}')",
            connection.name, connection.db_type, connection.module_name
        );
        Ok(connection)
    }

    /// Get a connection's metadata by name
    pub async fn get(&self, name: &str) -> Result<Connection, GovernanceError> {
        let connections = self.connections.read().await;
        connections
            .get(name)
            .cloned()
            .ok_or_else(|| GovernanceError::NotFound(format!("connection '{}' not found", name)))
    }

    /// Get the live connector handle for a connection
    pub async fn handle(&self, name: &str) -> Result<Arc<dyn Connector>, GovernanceError> {
        let handles = self.handles.read().await;
        handles.get(name).cloned().ok_or_else(|| {
            GovernanceError::NotFound(format!("no connector handle for connection '{}'", name))
        })
    }

    /// All registered connections, ordered by name
    pub async fn list(&self) -> Vec<Connection> {
        let connections = self.connections.read().await;
        let mut all: Vec<Connection> = connections.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Fresh snapshot of connections with status `active`.
    /// Each call re-queries the registry, so the sequence is restartable
    /// and reflects the latest state.
    pub async fn list_active(&self) -> Vec<Connection> {
        let connections = self.connections.read().await;
        let mut active: Vec<Connection> = connections
            .values()
            .filter(|c| c.status == ConnectionStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        active
    }

    /// Atomically transition a connection's status.
    ///
    /// Legal transitions: `active→inactive`, `active→error`, `error→active`.
    /// A same-status request is an idempotent no-op; anything else (notably
    /// `inactive→error`) is rejected.
    pub async fn mark_status(
        &self,
        name: &str,
        status: ConnectionStatus,
    ) -> Result<Connection, GovernanceError> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(name)
            .ok_or_else(|| GovernanceError::NotFound(format!("connection '{}' not found", name)))?;

        let legal = connection.status == status
            || matches!(
                (connection.status, status),
                (ConnectionStatus::Active, ConnectionStatus::Inactive)
                    | (ConnectionStatus::Active, ConnectionStatus::Error)
                    | (ConnectionStatus::Error, ConnectionStatus::Active)
            );
        if !legal {
            return Err(GovernanceError::InvalidTransition(format!(
                "connection '{}' cannot move {:?} -> {:?}",
                name, connection.status, status
            )));
        }

        connection.status = status;
        debug!("Connection '{}' status set to {:?}", name, status);
        Ok(connection.clone())
    }

    /// Record a health-check outcome, applying the status transitions the
    /// health subsystem owns: active+unhealthy becomes `error`, a recovered
    /// `error` connection becomes `active`, `inactive` is left alone.
    pub async fn record_health_check(
        &self,
        name: &str,
        healthy: bool,
    ) -> Result<Connection, GovernanceError> {
        let mut connections = self.connections.write().await;
        let connection = connections
            .get_mut(name)
            .ok_or_else(|| GovernanceError::NotFound(format!("connection '{}' not found", name)))?;

        connection.last_health_check = Some(Utc::now());
        match (connection.status, healthy) {
            (ConnectionStatus::Active, false) => {
                warn!("Connection '{}' failed health check, marking error", name);
                connection.status = ConnectionStatus::Error;
            }
            (ConnectionStatus::Error, true) => {
                info!("Connection '{}' recovered, marking active", name);
                connection.status = ConnectionStatus::Active;
            }
            _ => {}
        }
        Ok(connection.clone())
    }

    /// Sweep every registered handle with a per-call timeout.
    /// A timed-out or failed probe counts as unhealthy.
    pub async fn run_health_checks(&self, timeout: Duration) -> HealthSweep {
        let names: Vec<String> = {
            let connections = self.connections.read().await;
            connections.keys().cloned().collect()
        };

        let mut sweep = HealthSweep::default();
        for name in names {
            let Ok(handle) = self.handle(&name).await else {
                continue;
            };
            let healthy = match tokio::time::timeout(timeout, handle.health_check()).await {
                Ok(Ok(report)) => report.healthy,
                Ok(Err(e)) => {
                    debug!("Health check for '{}' failed: {}", name, e);
                    false
                }
                Err(_) => {
                    debug!("Health check for '{}' timed out", name);
                    false
                }
            };

            sweep.checked += 1;
            if healthy {
                sweep.healthy += 1;
            } else {
                sweep.unhealthy += 1;
            }
            // Connection may have been deregistered mid-sweep
            let _ = self.record_health_check(&name, healthy).await;
        }
        sweep
    }

    /// Remove a connection and close its handle
    pub async fn deregister(&self, name: &str) -> Result<(), GovernanceError> {
        let mut connections = self.connections.write().await;
        if connections.remove(name).is_none() {
            return Err(GovernanceError::NotFound(format!(
                "connection '{}' not found",
                name
            )));
        }
        drop(connections);

        let handle = {
            let mut handles = self.handles.write().await;
            handles.remove(name)
        };
        if let Some(handle) = handle {
            handle.close().await;
        }

        info!("Deregistered connection '{}'", name);
        Ok(())
    }

    /// Close every handle (shutdown path)
    pub async fn close_all(&self) {
        let handles: Vec<Arc<dyn Connector>> = {
            let mut handles = self.handles.write().await;
            handles.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            handle.close().await;
        }
        let mut connections = self.connections.write().await;
        connections.clear();
        info!("Closed all connector handles");
    }

    /// Get connection count
    pub async fn count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
