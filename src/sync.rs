//! The sync engine: bidirectional replication over a thin transport.
//!
//! Pull fetches everything newer than the client's recorded high-water
//! mark and ingests it; push sends everything locally authored since the
//! last confirmed push. A plain monotonic cursor suffices here since every
//! tessella already carries a locally-assigned, replica-relative id.
use crate::error::SmaragdaError;
use crate::error::SmaragdaResult;
use crate::ids::ReplicaId;
use crate::store::LogStore;
use crate::types::{LocalId, Res, Tessella};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

/// A pull request: "send me everything newer than `since`."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// The largest id of this peer's tessellae the caller has already seen.
    pub since: LocalId,
    /// An opaque caller identifier, surfaced in server logs.
    pub device_id: String,
}

/// The response to a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// Every res newly visible since `since` (referenced by the tessellae below).
    pub res: Vec<Res>,
    /// Every tessella with `id > since`, in ascending id order.
    pub tessellae: Vec<Tessella>,
    /// The server's own current high-water mark, for the client to record.
    pub high_water_mark: LocalId,
}

/// A push request: "here is what I've authored that you don't have yet."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    /// An opaque caller identifier, surfaced in server logs.
    pub device_id: String,
    /// Res whose creation has not yet been confirmed pushed.
    pub res: Vec<Res>,
    /// Tessellae with `source == "local"` and `id > last_pushed_local_id`.
    pub tessellae: Vec<Tessella>,
}

/// The response to a push request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    /// How many tessellae the server newly accepted (excludes duplicates).
    pub accepted: usize,
    /// The server's own current high-water mark.
    pub high_water_mark: LocalId,
}

/// The wire protocol a sync peer must implement. Kept as a trait so the
/// kernel's pull/push/ingest logic never depends on the transport: HTTP is
/// the default implementation (see [`crate::transport::http`]) but is not
/// baked into the sync engine itself.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Issue a pull request to the peer.
    async fn pull(&self, request: PullRequest) -> SmaragdaResult<PullResponse>;
    /// Issue a push request to the peer.
    async fn push(&self, request: PushRequest) -> SmaragdaResult<PushResponse>;
}

/// Client-side bookkeeping for one peer relationship: how much of the
/// peer's history has been pulled, and how much of the local history has
/// been confirmed pushed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// Largest peer tessella id ever pulled.
    pub server_hwm: LocalId,
    /// Largest local tessella id ever confirmed pushed.
    pub last_pushed_local_id: LocalId,
}

/// Ingest a batch of res/tessellae received from a peer (pull response or
/// push request — the rules are symmetric). Returns the number of
/// tessellae newly accepted (duplicates by origin key are not counted).
pub async fn ingest_batch(
    store: &LogStore,
    res: Vec<Res>,
    tessellae: Vec<Tessella>,
    peer_tag: &str,
) -> SmaragdaResult<usize> {
    for incoming in res {
        if store.res_exists(incoming.id) {
            let existing = store.get_res(incoming.id)?;
            if existing.genus_id != incoming.genus_id {
                return Err(SmaragdaError::DivergentRes {
                    res_id: incoming.id.to_string(),
                    local_genus: existing.genus_id.to_string(),
                    incoming_genus: incoming.genus_id.to_string(),
                });
            }
        } else {
            store.create_res(incoming).await?;
        }
    }

    let mut accepted = 0;
    for tessella in tessellae {
        if store.has_origin(tessella.origin) {
            continue;
        }
        store
            .ingest_tessella(
                tessella.res_id,
                tessella.branch_id,
                tessella.data,
                tessella.created_at,
                tessella.origin,
                format!("sync:{peer_tag}"),
            )
            .await?;
        accepted += 1;
    }
    Ok(accepted)
}

/// Drives pull/push against one peer over a [`SyncTransport`], maintaining
/// the client-side [`SyncState`] bookkeeping table.
pub struct SyncEngine {
    store: std::sync::Arc<LogStore>,
    replica_id: ReplicaId,
    state: Mutex<SyncState>,
}

impl SyncEngine {
    /// Construct a sync engine over a shared log store.
    pub fn new(store: std::sync::Arc<LogStore>) -> Self {
        let replica_id = store.replica_id();
        Self {
            store,
            replica_id,
            state: Mutex::new(SyncState::default()),
        }
    }

    /// The current client-side bookkeeping snapshot.
    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pull everything new from the peer and ingest it. Returns the number
    /// of tessellae newly accepted.
    pub async fn pull(&self, transport: &dyn SyncTransport) -> SmaragdaResult<usize> {
        let since = self.state().server_hwm;
        let response = transport
            .pull(PullRequest {
                since,
                device_id: self.replica_id.to_string(),
            })
            .await?;

        let accepted = ingest_batch(
            &self.store,
            response.res,
            response.tessellae,
            &self.replica_id.to_string(),
        )
        .await?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.server_hwm = state.server_hwm.max(response.high_water_mark);
        info!(accepted, hwm = state.server_hwm, "pull complete");
        Ok(accepted)
    }

    /// Push every locally authored, not-yet-confirmed tessella to the peer.
    pub async fn push(&self, transport: &dyn SyncTransport) -> SmaragdaResult<usize> {
        let last_pushed = self.state().last_pushed_local_id;
        let unpushed: Vec<Tessella> = self
            .store
            .tessellae_since(last_pushed)
            .into_iter()
            .filter(|t| t.source == "local")
            .collect();

        let res_ids: std::collections::HashSet<_> = unpushed.iter().map(|t| t.res_id).collect();
        let res: Vec<Res> = res_ids
            .into_iter()
            .filter_map(|id| self.store.get_res(id).ok())
            .collect();

        if unpushed.is_empty() {
            return Ok(0);
        }
        let max_id = unpushed.iter().map(|t| t.id).max().unwrap_or(last_pushed);

        let response = transport
            .push(PushRequest {
                device_id: self.replica_id.to_string(),
                res,
                tessellae: unpushed,
            })
            .await?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_pushed_local_id = max_id;
        info!(
            accepted = response.accepted,
            hwm = response.high_water_mark,
            "push complete"
        );
        Ok(response.accepted)
    }
}
