//! # Smaragda — a local-first, event-sourced knowledge kernel
//!
//! Smaragda replays typed entities ("res") from an append-only log of
//! immutable events ("tessellae"). Nothing is ever mutated in place:
//! current state is always a pure fold over history, which is what makes
//! two replicas that hold the same tessella set converge to byte-equal
//! state regardless of the order they received them in.
//!
//! ## Quick start
//!
//! ```ignore
//! use smaragda::Smaragda;
//! use smaragda::genus::{Attribute, AttrType, StateDef};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let kernel = Smaragda::open("/tmp/smaragda-db").await?;
//!
//!     let server_genus = kernel.registry().define_entity_genus(
//!         "Server",
//!         None,
//!         vec![Attribute::new("hostname", AttrType::Text, true)],
//!         vec![StateDef { name: "active".into(), initial: true }],
//!         vec![],
//!     )?;
//!
//!     let (res_id, _state) = kernel
//!         .mutator()
//!         .create_entity(server_genus, kernel.main_branch(), vec![], None, None)?;
//!     println!("created {res_id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **Log store** ([`store`]) — durable append-only persistence for res
//!    and tessellae, replayed on open.
//! 2. **Genus registry** ([`genus`]) — dynamic schema: attributes, state
//!    machines, relationship roles.
//! 3. **Materializer** ([`materializer`]) — the pure fold from tessellae
//!    to current state.
//! 4. **Mutation API** ([`mutation`]) — the only way new tessellae get
//!    appended; validates against the genus registry first.
//! 5. **Branch manager** ([`branch`]) — named, mergeable isolation scopes.
//! 6. **Sync engine** ([`sync`], [`transport`]) — bidirectional
//!    replication over a pluggable transport, HTTP by default.
//! 7. **Query layer** ([`query`]) — read-side filtering, search, history,
//!    and timeline operations.
use std::path::Path;
use std::sync::Arc;

pub mod branch;
pub mod config;
pub mod error;
pub mod genus;
pub mod ids;
pub mod materializer;
pub mod mutation;
pub mod query;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(feature = "http")]
pub mod transport;

pub use error::{MergeConflict, SmaragdaError, SmaragdaResult};
pub use ids::{Id, ReplicaId};
pub use types::{AttributeValue, Branch, BranchStatus, OriginKey, Res, Tessella, TessellaType};

use branch::BranchManager;
use config::Config;
use genus::GenusRegistry;
use mutation::Mutator;
use store::LogStore;
use sync::SyncEngine;

/// The Smaragda kernel: a log store plus the genus registry, branch
/// manager, and sync engine built on top of it. Construct one per open
/// database directory; clone the `Arc`-wrapped fields (not `Smaragda`
/// itself, which owns the single-writer file lock) across tasks.
pub struct Smaragda {
    store: Arc<LogStore>,
    registry: GenusRegistry,
    branches: BranchManager,
    main_branch: Id,
    sync: SyncEngine,
}

impl Smaragda {
    /// Open (creating if absent) a database at `db_path`, replaying its
    /// write-ahead log and minting a fresh replica id for this process.
    pub async fn open(db_path: impl AsRef<Path>) -> SmaragdaResult<Self> {
        Self::open_as(db_path, ReplicaId::new()).await
    }

    /// Open a database under an explicit replica id, e.g. one persisted
    /// from a previous run so sync peers recognize this replica across
    /// restarts.
    pub async fn open_as(db_path: impl AsRef<Path>, replica_id: ReplicaId) -> SmaragdaResult<Self> {
        let store = Arc::new(LogStore::open(db_path.as_ref(), replica_id).await?);
        let (branches, main_branch) = BranchManager::new();
        Ok(Self {
            sync: SyncEngine::new(store.clone()),
            store,
            registry: GenusRegistry::new(),
            branches,
            main_branch,
        })
    }

    /// Open the database named by [`Config::db_path`].
    pub async fn open_from_config(config: &Config) -> SmaragdaResult<Self> {
        Self::open(&config.db_path).await
    }

    /// The durable log store.
    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// The genus (schema) registry.
    pub fn registry(&self) -> &GenusRegistry {
        &self.registry
    }

    /// The branch manager.
    pub fn branches(&self) -> &BranchManager {
        &self.branches
    }

    /// The root `main` branch created when this kernel was opened.
    pub fn main_branch(&self) -> Id {
        self.main_branch
    }

    /// A mutator bound to this kernel's store and registry.
    pub fn mutator(&self) -> Mutator<'_> {
        Mutator::new(&self.store, &self.registry)
    }

    /// A query executor bound to this kernel's store, registry, and branches.
    pub fn query(&self) -> query::QueryExecutor<'_> {
        query::QueryExecutor::new(&self.store, &self.registry, &self.branches)
    }

    /// The sync engine driving pull/push against a configured peer.
    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    /// This replica's identity, as stamped on every locally authored tessella.
    pub fn replica_id(&self) -> ReplicaId {
        self.store.replica_id()
    }
}

/// Prelude module for convenient imports: `use smaragda::prelude::*;`
pub mod prelude {
    pub use crate::branch::BranchManager;
    pub use crate::config::Config;
    pub use crate::error::{MergeConflict, SmaragdaError, SmaragdaResult};
    pub use crate::genus::{
        ActionGenus, AttrType, Attribute, EntityGenus, FeatureGenus, Genus, GenusEvolution,
        GenusRegistry, RelationshipGenus, RoleDef, StateDef, Transition,
    };
    pub use crate::ids::{Id, ReplicaId};
    pub use crate::materializer::{EntityState, Health};
    pub use crate::mutation::{BatchOp, BatchTarget, Mutator};
    pub use crate::query::{Filter, QueryExecutor};
    pub use crate::session::{SessionManager, SessionState};
    pub use crate::store::LogStore;
    pub use crate::sync::{SyncEngine, SyncTransport};
    pub use crate::types::{AttributeValue, Branch, BranchStatus, OriginKey, Res, Tessella, TessellaType};
    pub use crate::Smaragda;
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{json, Value as JsonValue};

    #[cfg(feature = "http")]
    pub use crate::transport::http::{HttpSyncServer, HttpTransport};
}

/// Initialize the logging system with the `SMARAGDA_LOG` environment
/// variable controlling verbosity (`error`/`warn`/`info`/`debug`/`trace`),
/// defaulting to `info` when unset.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env(config::ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Initialize logging at an explicit level, ignoring `SMARAGDA_LOG`.
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use genus::{Attribute, AttrType, StateDef};

    #[tokio::test]
    async fn open_seeds_main_branch_and_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = Smaragda::open(dir.path()).await.unwrap();
        assert!(kernel.branches().get(kernel.main_branch()).is_ok());
    }

    #[tokio::test]
    async fn create_entity_through_the_kernel_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = Smaragda::open(dir.path()).await.unwrap();
        let genus = kernel
            .registry()
            .define_entity_genus(
                "Server",
                None,
                vec![Attribute::new("hostname", AttrType::Text, true)],
                vec![StateDef {
                    name: "active".into(),
                    initial: true,
                }],
                vec![],
            )
            .unwrap();

        let (res_id, state) = kernel
            .mutator()
            .create_entity(genus, kernel.main_branch(), vec![], None, None)
            .await
            .unwrap();
        assert_eq!(state.status.as_deref(), Some("active"));
        assert!(kernel.store().res_exists(res_id));
    }
}
