//! The gateway HTTP surface: WebSocket upgrades and read-only metrics.

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use weft_core::validate_room;
use weft_queue::QueueAttributes;

use crate::error::GatewayResult;
use crate::ingress;
use crate::state::GatewayState;

/// Build the gateway router.
#[must_use]
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/chat/{room_id}", get(chat_upgrade))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/metrics/queues", get(queue_depths))
        .with_state(state)
}

/// Serve the gateway until the shutdown token fires.
///
/// # Errors
///
/// Returns a [`GatewayError`](crate::GatewayError) if the listener cannot
/// bind or the server fails.
pub async fn serve(
    state: Arc<GatewayState>,
    bind: SocketAddr,
    shutdown: CancellationToken,
) -> GatewayResult<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    Ok(())
}

async fn chat_upgrade(
    State(state): State<Arc<GatewayState>>,
    Path(room_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    // Reject bad rooms before the upgrade: the path segment must be a
    // decimal id inside the configured room set.
    let Ok(room) = room_id.parse::<u32>() else {
        return (StatusCode::BAD_REQUEST, "roomId must be an integer").into_response();
    };
    let room = match validate_room(room, state.rooms) {
        Ok(room) => room,
        Err(rejection) => {
            warn!(room = room_id, peer = %peer, "rejected upgrade");
            return (StatusCode::BAD_REQUEST, rejection.reason).into_response();
        },
    };

    ws.on_upgrade(move |socket| ingress::run_session(state, room, peer, socket))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    node: String,
    #[serde(rename = "uptimeSecs")]
    uptime_secs: u64,
    #[serde(rename = "totalSessions")]
    total_sessions: usize,
}

async fn healthz(State(state): State<Arc<GatewayState>>) -> Response {
    let health = Health {
        status: "ok",
        node: state.node_id.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        total_sessions: state.registry.session_count(),
    };
    axum::Json(health).into_response()
}

async fn metrics(State(state): State<Arc<GatewayState>>) -> Response {
    let snapshot = state.metrics.snapshot(
        state.registry.room_count() as u64,
        state.registry.session_count() as u64,
    );
    axum::Json(snapshot).into_response()
}

async fn queue_depths(State(state): State<Arc<GatewayState>>) -> Response {
    let mut depths: BTreeMap<u32, QueueAttributes> = BTreeMap::new();
    for room in 1..=state.rooms {
        let name = state.naming.queue_name(weft_core::RoomId(room));
        let Some(url) = state.urls.get(&name).await else {
            continue;
        };
        match state.queue.get_attributes(&url).await {
            Ok(attributes) => {
                depths.insert(room, attributes);
            },
            Err(e) => warn!(room, error = %e, "queue attributes unavailable"),
        }
    }
    axum::Json(depths).into_response()
}
