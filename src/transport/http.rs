//! HTTP sync transport: axum server + reqwest client, bearer-authenticated.
//!
//! A typed request/response struct per route, errors collapsed to a bare
//! `StatusCode` on the wire. Bearer-token extraction strips the
//! `Authorization` header's `"Bearer "` prefix by hand rather than pulling
//! in an auth middleware crate for one check. This module only compiles
//! when the crate's `http` feature is enabled.
use crate::error::{SmaragdaError, SmaragdaResult};
use crate::store::LogStore;
use crate::sync::{ingest_batch, PullRequest, PullResponse, PushRequest, PushResponse, SyncTransport};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

fn check_bearer(headers: &HeaderMap, expected: &str) -> Result<(), StatusCode> {
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

struct ServerState {
    store: Arc<LogStore>,
    auth_token: String,
}

/// Serves `/sync/pull` and `/sync/push` over HTTP for a single log store.
pub struct HttpSyncServer {
    store: Arc<LogStore>,
    auth_token: String,
}

impl HttpSyncServer {
    /// Construct a server over `store`, requiring `auth_token` on every request.
    pub fn new(store: Arc<LogStore>, auth_token: String) -> Self {
        Self { store, auth_token }
    }

    /// Bind and serve until the process is killed.
    pub async fn bind(self, addr: &str) -> SmaragdaResult<()> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| SmaragdaError::TransportError(format!("invalid address: {e}")))?;
        let state = Arc::new(ServerState {
            store: self.store,
            auth_token: self.auth_token,
        });
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| SmaragdaError::TransportError(format!("failed to bind: {e}")))?;
        info!(%addr, "sync server listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| SmaragdaError::TransportError(format!("server error: {e}")))?;
        Ok(())
    }
}

fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/sync/pull", post(handle_pull))
        .route("/sync/push", post(handle_push))
        .with_state(state)
}

async fn handle_pull(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<PullRequest>,
) -> Result<Json<PullResponse>, StatusCode> {
    check_bearer(&headers, &state.auth_token)?;
    let tessellae = state.store.tessellae_since(request.since);
    let res = tessellae
        .iter()
        .map(|t| t.res_id)
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .filter_map(|id| state.store.get_res(id).ok())
        .collect();
    Ok(Json(PullResponse {
        res,
        tessellae,
        high_water_mark: state.store.local_high_water_mark(),
    }))
}

async fn handle_push(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>, StatusCode> {
    check_bearer(&headers, &state.auth_token)?;
    let device_id = request.device_id.clone();
    let accepted = ingest_batch(&state.store, request.res, request.tessellae, &device_id)
        .await
        .map_err(|e| {
            warn!(error = %e, device_id, "push ingest failed");
            StatusCode::CONFLICT
        })?;
    Ok(Json(PushResponse {
        accepted,
        high_water_mark: state.store.local_high_water_mark(),
    }))
}

/// A [`SyncTransport`] that speaks to a peer's [`HttpSyncServer`] over HTTP.
pub struct HttpTransport {
    base_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Construct a client transport pointed at `base_url` (e.g.
    /// `"https://peer.example.com"`).
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn pull(&self, request: PullRequest) -> SmaragdaResult<PullResponse> {
        let response = self
            .client
            .post(format!("{}/sync/pull", self.base_url))
            .bearer_auth(&self.auth_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| SmaragdaError::TransportError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SmaragdaError::TransportError(format!(
                "pull failed with status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| SmaragdaError::TransportError(e.to_string()))
    }

    async fn push(&self, request: PushRequest) -> SmaragdaResult<PushResponse> {
        let response = self
            .client
            .post(format!("{}/sync/push", self.base_url))
            .bearer_auth(&self.auth_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| SmaragdaError::TransportError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SmaragdaError::TransportError(format!(
                "push failed with status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| SmaragdaError::TransportError(e.to_string()))
    }
}
