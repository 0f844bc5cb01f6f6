//! HTTP transport: JSON-RPC at `POST /`, the external A2A dialect at
//! `POST /a2a`, a single-frame SSE compatibility endpoint, and the
//! well-known card routes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hub_core::error::{HubError, Result};
use hub_core::jsonrpc::{Dispatcher, Request, Response, RpcError};

use crate::a2a::executor::HubExecutor;
use crate::hub::HubState;

/// Drain window granted to in-flight requests on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(3);

#[derive(Clone)]
struct HttpState {
    hub: Arc<HubState>,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<HubExecutor>,
    base_url: String,
}

pub struct HttpTransport {
    state: HttpState,
    addr: String,
    shutdown: CancellationToken,
}

impl HttpTransport {
    pub fn new(
        hub: Arc<HubState>,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
    ) -> HttpTransport {
        let base_url = hub.config.base_url();
        let addr = format!("{}:{}", hub.config.http.host, hub.config.http.port);
        let executor = Arc::new(HubExecutor::new(hub.clone(), dispatcher.clone()));
        HttpTransport {
            state: HttpState {
                hub,
                dispatcher,
                executor,
                base_url,
            },
            addr,
            shutdown,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .route("/a2a", post(handle_a2a))
            .route("/stream", post(handle_stream))
            .route("/health", get(handle_health))
            .route("/.well-known/agent.json", get(handle_hub_card))
            .route("/.well-known/agents", get(handle_agents))
            .route("/.well-known/agents/{id}", get(handle_agent_card))
            .with_state(self.state.clone())
    }

    pub async fn run(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(HubError::Io)?;
        info!(addr = %self.addr, "http transport listening");

        let shutdown = self.shutdown.clone();
        let graceful = {
            let shutdown = shutdown.clone();
            async move {
                shutdown.cancelled().await;
            }
        };
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(graceful);

        let drain = async {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_DRAIN).await;
        };
        tokio::select! {
            result = server => result.map_err(HubError::Io)?,
            _ = drain => {}
        }
        info!("http transport stopped");
        Ok(())
    }
}

async fn handle_rpc(State(state): State<HttpState>, body: String) -> Json<Response> {
    let request: Request = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return Json(Response::error(RpcError::parse_error(), None)),
    };
    Json(state.dispatcher.handle(request).await)
}

async fn handle_a2a(State(state): State<HttpState>, body: String) -> Json<Response> {
    let request: Request = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return Json(Response::error(RpcError::parse_error(), None)),
    };
    Json(state.executor.handle_rpc(request).await)
}

/// Single-event SSE reply for streaming-capable clients.
async fn handle_stream(State(state): State<HttpState>, body: String) -> AxumResponse {
    let request: Request = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let response = state.dispatcher.handle(request).await;
    let payload = serde_json::to_string(&response).unwrap_or_default();
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        format!("data: {payload}\n\n"),
    )
        .into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn handle_hub_card(State(state): State<HttpState>) -> Json<hub_core::model::AgentCard> {
    Json(state.hub.hub_card(&state.base_url))
}

/// All agent cards, URLs rewritten to the hub base.
async fn handle_agents(State(state): State<HttpState>) -> Json<serde_json::Value> {
    let agents = state.hub.registry.list().await;
    let cards: Vec<hub_core::model::AgentCard> = agents
        .iter()
        .map(|entry| {
            let mut card = entry.card.clone();
            card.url = format!(
                "{}/.well-known/agents/{}.json",
                state.base_url,
                entry.agent.id()
            );
            card
        })
        .collect();
    Json(serde_json::to_value(cards).unwrap_or_default())
}

async fn handle_agent_card(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> AxumResponse {
    let id = id.trim_end_matches(".json");
    let Some(entry) = state.hub.registry.get(id).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut card = entry.card.clone();
    card.url = format!(
        "{}/.well-known/agents/{}.json",
        state.base_url,
        entry.agent.id()
    );
    Json(card).into_response()
}
