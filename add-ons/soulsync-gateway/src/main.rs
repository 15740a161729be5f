//! Axum gateway for SoulSync: chat turns, the moderator queue and consent settings.
//! Config-driven via `GatewayConfig` plus the core's `EscalationConfig`.

mod config;
mod handlers;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use crate::config::GatewayConfig;
use soulsync_core::{
    generator_from_env, sender_from_env, EscalationConfig, EscalationOrchestrator, EscalationResult,
    EscalationStore, ProfileStore,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<GatewayConfig>,
    pub(crate) orchestrator: Arc<EscalationOrchestrator>,
    pub(crate) profiles: ProfileStore,
    pub(crate) store: EscalationStore,
}

impl AppState {
    pub(crate) fn new(
        config: GatewayConfig,
        store: EscalationStore,
        orchestrator: EscalationOrchestrator,
    ) -> EscalationResult<Self> {
        Ok(Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            profiles: store.profiles()?,
            store,
        })
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let gateway_config = match GatewayConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(target: "soulsync::gateway", error = %e, "Gateway config invalid; using defaults");
            GatewayConfig::default()
        }
    };
    let mut escalation_config = EscalationConfig::from_env();
    if let Some(path) = gateway_config.storage_path.clone() {
        escalation_config.storage_path = path;
    }

    let store = match EscalationStore::open_path(&escalation_config.storage_path) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(
                target: "soulsync::gateway",
                path = %escalation_config.storage_path,
                error = %e,
                "Failed to open escalation store"
            );
            std::process::exit(1);
        }
    };

    let mode = escalation_config.mode;
    let state = match EscalationOrchestrator::new(&store, escalation_config, sender_from_env())
        .map(|o| o.with_generator(generator_from_env()))
        .and_then(|o| AppState::new(gateway_config, store.clone(), o))
    {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(target: "soulsync::gateway", error = %e, "Failed to start orchestrator");
            std::process::exit(1);
        }
    };

    let addr = match state.config.socket_addr() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(target: "soulsync::gateway", error = %e, "Invalid bind address");
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(target: "soulsync::gateway", %addr, error = %e, "Port already in use or unavailable");
            std::process::exit(1);
        }
    };

    tracing::info!(
        target: "soulsync::gateway",
        app = %state.config.app_name,
        %addr,
        mode = mode.as_str(),
        "SoulSync gateway listening"
    );

    let app = build_app(state);
    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!(target: "soulsync::gateway", "Shutdown requested");
    });
    if let Err(e) = serve.await {
        tracing::error!(target: "soulsync::gateway", error = %e, "Server error");
    }
    if let Err(e) = store.flush().await {
        tracing::warn!(target: "soulsync::gateway", error = %e, "Final flush failed");
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/turns", post(handlers::chat::submit_turn))
        .route("/api/v1/chat", post(handlers::chat::chat_reply))
        .route("/api/v1/chat/stream", post(handlers::chat::chat_stream))
        .route("/api/v1/moderator/queue", get(handlers::moderator::list_queue))
        .route("/api/v1/moderator/audit", get(handlers::moderator::recent_audit))
        .route(
            "/api/v1/moderator/escalation/:case_id",
            get(handlers::moderator::get_case),
        )
        .route(
            "/api/v1/moderator/escalation/:case_id/approve",
            post(handlers::moderator::approve_case),
        )
        .route(
            "/api/v1/moderator/escalation/:case_id/reject",
            post(handlers::moderator::reject_case),
        )
        .route(
            "/api/v1/profile/:user_id/consent",
            get(handlers::profile::get_consent).put(handlers::profile::put_consent),
        )
        .layer(cors)
        .with_state(state)
}
