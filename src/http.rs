//! Read-only admin HTTP surface, generalized from the teacher's
//! single-route Prometheus server into the full set of operational
//! endpoints.

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::state::{Core, SessionSnapshot};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AdminState {
    pub core: Arc<Core>,
    pub started_at: Instant,
    pub rate_limiter: RateLimiter,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    online_users: u64,
    active_rooms: u64,
    version: String,
    environment: String,
}

#[derive(Serialize)]
struct StatsResponse {
    online_users: u64,
    active_rooms: u64,
    queue_depth: u64,
    uptime_seconds: u64,
    total_connections: u64,
    average_wait_time_ms: u64,
}

#[derive(Serialize)]
struct PublicConfigResponse {
    stun_servers: Vec<String>,
    turn_servers: Vec<String>,
    max_message_length: usize,
    max_chat_duration_ms: i64,
}

#[derive(Serialize)]
struct DebugResponse {
    queue_depth: u64,
    online_users: u64,
    active_rooms: u64,
    sessions: Vec<SessionSnapshot>,
}

async fn health_handler(State(state): State<AdminState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        online_users: state.core.online_count(),
        active_rooms: state.core.active_room_count(),
        version: state.core.config.server.version.clone(),
        environment: state.core.config.server.environment.clone(),
    })
}

async fn stats_handler(State(state): State<AdminState>) -> impl IntoResponse {
    Json(StatsResponse {
        online_users: state.core.online_count(),
        active_rooms: state.core.active_room_count(),
        queue_depth: state.core.queue_depth(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        total_connections: state.core.total_connections(),
        average_wait_time_ms: state.core.average_wait_time_ms(),
    })
}

async fn config_handler(State(state): State<AdminState>) -> impl IntoResponse {
    Json(PublicConfigResponse {
        stun_servers: state.core.config.webrtc.stun_servers.clone(),
        turn_servers: state.core.config.webrtc.turn_servers.clone(),
        max_message_length: state.core.config.chat.max_message_length,
        max_chat_duration_ms: state.core.config.chat.max_chat_duration_ms,
    })
}

async fn debug_handler(State(state): State<AdminState>) -> impl IntoResponse {
    if state.core.config.server.environment != "development" {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    Json(DebugResponse {
        queue_depth: state.core.queue_depth(),
        online_users: state.core.online_count(),
        active_rooms: state.core.active_room_count(),
        sessions: state.core.registry.snapshot(),
    })
    .into_response()
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn rate_limit_middleware(
    State(state): State<AdminState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if state.rate_limiter.check(addr.ip()) {
        next.run(request).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response()
    }
}

pub fn build_admin_router(core: Arc<Core>, config: &Config) -> Router {
    let state = AdminState {
        core,
        started_at: Instant::now(),
        rate_limiter: RateLimiter::new(
            config.admin.rate_limit_window_ms,
            config.admin.rate_limit_max_requests,
        ),
    };

    let cors = if config.admin.allowed_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<axum::http::HeaderValue> = config
            .admin
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/config", get(config_handler))
        .route("/debug", get(debug_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Runs the admin HTTP server; a long-running task meant to be
/// spawned in the background alongside the websocket gateway.
pub async fn run_admin_server(core: Arc<Core>, config: Config) {
    let addr = config.admin.address;
    let app = build_admin_router(core, &config);

    tracing::info!("admin HTTP server listening on {addr}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind admin HTTP server on {addr}: {e}");
            return;
        }
    };
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("admin HTTP server error: {e}");
    }
}
