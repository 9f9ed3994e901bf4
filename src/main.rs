//! GovLens - Multi-Database Governance Engine
//!
//! Registers database connections across heterogeneous engines (MongoDB,
//! PostgreSQL, Redis, Cosmos DB, Blob Storage), evaluates governance
//! policies against them, and records deduplicated violations plus an
//! append-only audit trail.
//!
//! GOVERNANCE FLOW:
//! - Register: connections enter the registry with their live connector
//! - Evaluate: the engine runs applicable policies per connection
//! - Record: threshold-clearing findings become violations (deduplicated
//!   by fingerprint) and audit events
//! - Remediate: violations move open -> in_progress -> resolved/ignored

mod audit;
mod config;
mod connector;
mod engine;
mod error;
mod evaluator;
mod ledger;
mod policy;
mod registry;
mod routes;
mod state;

use crate::config::Settings;
use crate::policy::seed_default_policies;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting GovLens - Multi-Database Governance Engine...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let state = Arc::new(AppState::new(settings.clone()));

    // Install the default policies; re-running is idempotent
    let seed = seed_default_policies(&state.policies, &state.audit).await?;
    info!(
        "✅ Default policies ready ({} seeded, {} already present)",
        seed.seeded, seed.skipped
    );

    // Background health-check sweeps over every registered connector
    spawn_health_check_loop(state.clone());

    // Build the router
    let app = create_router(state.clone(), &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Policies ───");
    info!("   POST /api/policies               - Register a governance policy");
    info!("   GET  /api/policies               - List policies (?dbType= filters)");
    info!("   GET  /api/policies/:id           - Get one policy");
    info!("   PUT  /api/policies/:id           - Update a policy");
    info!("");
    info!("   ─── Connections ───");
    info!("   POST /api/connections            - Register a database for governance");
    info!("   GET  /api/connections            - List governed connections");
    info!("   POST /api/connections/:name/status - Transition connection status");
    info!("");
    info!("   ─── Governance Runs ───");
    info!("   POST /api/audits                 - Evaluate all (or one) connection");
    info!("   POST /api/audits/cancel          - Cancel the in-flight run");
    info!("   GET  /api/violations             - List violations (filterable)");
    info!("   POST /api/violations/:id/status  - Transition a violation");
    info!("   GET  /api/audit-events           - Read the audit trail");
    info!("   GET  /api/dashboard              - Governance summary");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.registry.close_all().await;
    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,govlens_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Periodically sweep registered connectors and update connection statuses
fn spawn_health_check_loop(state: Arc<AppState>) {
    let interval = state.settings.engine.health_check_interval();
    let timeout = state.settings.engine.health_check_timeout();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let sweep = state.registry.run_health_checks(timeout).await;
            if sweep.checked > 0 {
                debug!(
                    "Health sweep: {} checked, {} healthy, {} unhealthy",
                    sweep.checked, sweep.healthy, sweep.unhealthy
                );
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
