//! Waflow Orchestrator Server
//!
//! Receives provider webhook deliveries, advances conversational-flow
//! sessions, and runs broadcasts. Single-node mode over the in-memory
//! store; a default tenant is seeded from the provider credentials in the
//! environment (`ACCESS_TOKEN` + `PHONE_NUMBER_ID`).

use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wf_broadcast::BroadcastRunner;
use wf_common::Tenant;
use wf_config::{AppConfig, ConfigLoader};
use wf_dispatch::{app_router, AppState, Dispatcher};
use wf_engine::{Engine, SessionGate};
use wf_store::{MemoryStore, Store};
use wf_transport::{CloudApiTransport, CloudApiTransportConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for local development)
    let _ = dotenvy::dotenv();

    wf_common::logging::init_logging("wf-server");

    info!("Starting Waflow Orchestrator");

    let config = ConfigLoader::new().load()?;
    config.validate()?;

    let store = Arc::new(MemoryStore::new());
    seed_default_tenant(&store, &config);

    let transport_config = CloudApiTransportConfig::default()
        .with_api_version(&config.provider.graph_api_version);
    let transport = Arc::new(CloudApiTransport::new(transport_config)?);

    let engine = Arc::new(Engine::new(
        store.clone() as Arc<dyn Store>,
        transport.clone(),
    ));
    let gate = Arc::new(SessionGate::new());

    let fallback = config
        .provider
        .pin_fallback_to_first_tenant
        .then(|| config.provider.phone_number_id.clone())
        .filter(|id| !id.is_empty());
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone() as Arc<dyn Store>,
        engine.clone(),
        gate.clone(),
        fallback,
    ));

    let runner = Arc::new(BroadcastRunner::new(
        store.clone() as Arc<dyn Store>,
        engine,
        gate,
    ));

    let state = AppState {
        store: store.clone() as Arc<dyn Store>,
        dispatcher,
        runner,
        verify_token: config.provider.verify_token.clone(),
        app_secret: config.provider.app_secret.clone(),
    };

    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    info!(addr = %addr, "Starting HTTP server");
    let listener = TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Waflow Orchestrator shutdown complete");
    Ok(())
}

/// Seed the env-configured tenant so single-tenant deployments work out of
/// the box. Multi-tenant setups load tenants out-of-band.
fn seed_default_tenant(store: &MemoryStore, config: &AppConfig) {
    let provider = &config.provider;
    if provider.access_token.is_empty() || provider.phone_number_id.is_empty() {
        warn!("No ACCESS_TOKEN / PHONE_NUMBER_ID configured, starting without a tenant");
        return;
    }

    let mut tenant = Tenant::new("default", &provider.access_token, &provider.phone_number_id);
    if let Some(business_account_id) = &provider.business_account_id {
        tenant = tenant.with_business_account_id(business_account_id);
    }
    let tenant = store.seed_tenant(tenant);
    info!(tenant_id = %tenant.id, phone_number_id = %tenant.phone_number_id, "Seeded default tenant");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, letting in-flight invocations finish");
}
