//! The log store: durable, append-only persistence for res and tessellae.
//!
//! An in-memory `DashMap` index backed by a newline-delimited-JSON
//! write-ahead log with a CRC32 checksum per record. A single append-only
//! segment, no rotation: a Smaragda replica's log is not expected to
//! approach multi-GB scale. Records are whole structs rather than
//! content-addressed values — res and tessellae are already small and
//! structurally deduplicated, so there is nothing further to dedup.
use crate::error::{SmaragdaError, SmaragdaResult};
use crate::ids::{Id, ReplicaId};
use crate::types::{LocalId, OriginKey, Res, Tessella, TessellaType};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

const WAL_FILE_NAME: &str = "kernel.wal";
const LOCK_FILE_NAME: &str = "LOCK";

/// A single durable record. Untagged-by-name rather than `TessellaType`'s
/// own tag so the WAL format stays stable even if the event payload shape
/// grows new variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record")]
enum WalRecord {
    ResCreated { res: Res },
    TessellaAppended { tessella: Tessella },
}

/// A record plus its checksum, as written to disk. The checksum covers the
/// serialized `record` field only, so replay can detect truncation or bit
/// rot from crashes mid-write.
#[derive(Debug, Serialize, Deserialize)]
struct WalLine {
    record: WalRecord,
    checksum: String,
}

fn checksum_of(record: &WalRecord) -> SmaragdaResult<String> {
    let bytes = serde_json::to_vec(record)?;
    Ok(format!("crc32:{:08x}", crc32fast::hash(&bytes)))
}

/// An advisory single-writer lock: a sentinel file created at `open` and
/// removed on drop. Does not protect against another process crashing
/// without cleanup, only against a second `LogStore::open` call in the
/// same run racing this one.
struct WriterLock {
    path: PathBuf,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// The durable log store: one per open database directory.
///
/// Holds the full materializable history in memory (res table, tessellae
/// grouped by res) plus the open WAL file handle appends go to. All
/// concurrent access goes through `DashMap`'s lock-free sharded maps.
pub struct LogStore {
    replica_id: ReplicaId,
    res_table: DashMap<Id, Res>,
    tessellae_by_res: DashMap<Id, Vec<Tessella>>,
    by_origin: DashMap<OriginKey, Tessella>,
    next_local_id: AtomicU64,
    wal_path: PathBuf,
    wal_file: Mutex<Option<tokio::fs::File>>,
    _lock: WriterLock,
}

impl LogStore {
    /// Open (creating if absent) the database directory at `db_path`,
    /// replaying its WAL to rebuild the in-memory index.
    pub async fn open(db_path: &Path, replica_id: ReplicaId) -> SmaragdaResult<Self> {
        fs::create_dir_all(db_path).await.map_err(|e| {
            SmaragdaError::StorageError(format!("failed to create db dir: {e}"))
        })?;

        let lock_path = db_path.join(LOCK_FILE_NAME);
        let lock_result = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path);
        if lock_result.is_err() {
            return Err(SmaragdaError::StorageError(format!(
                "database at {} is already open (lock file present)",
                db_path.display()
            )));
        }
        let lock = WriterLock { path: lock_path };

        let wal_path = db_path.join(WAL_FILE_NAME);
        let res_table = DashMap::new();
        let tessellae_by_res: DashMap<Id, Vec<Tessella>> = DashMap::new();
        let by_origin: DashMap<OriginKey, Tessella> = DashMap::new();
        let mut max_local_id: LocalId = 0;

        if wal_path.exists() {
            let file = fs::File::open(&wal_path)
                .await
                .map_err(|e| SmaragdaError::StorageError(format!("failed to open WAL: {e}")))?;
            let mut lines = BufReader::new(file).lines();
            let mut replayed = 0u64;
            let mut corrupt = 0u64;
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| SmaragdaError::StorageError(format!("failed to read WAL: {e}")))?
            {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: WalLine = match serde_json::from_str(&line) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(error = %e, "skipping unparseable WAL line");
                        corrupt += 1;
                        continue;
                    }
                };
                let expected = checksum_of(&parsed.record)?;
                if expected != parsed.checksum {
                    warn!("skipping WAL line with checksum mismatch");
                    corrupt += 1;
                    continue;
                }
                match parsed.record {
                    WalRecord::ResCreated { res } => {
                        res_table.insert(res.id, res);
                    }
                    WalRecord::TessellaAppended { tessella } => {
                        max_local_id = max_local_id.max(tessella.id);
                        by_origin.insert(tessella.origin, tessella.clone());
                        tessellae_by_res
                            .entry(tessella.res_id)
                            .or_default()
                            .push(tessella);
                    }
                }
                replayed += 1;
            }
            info!(replayed, corrupt, "replayed write-ahead log");
        }

        let wal_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .await
            .map_err(|e| SmaragdaError::StorageError(format!("failed to open WAL: {e}")))?;

        Ok(Self {
            replica_id,
            res_table,
            tessellae_by_res,
            by_origin,
            next_local_id: AtomicU64::new(max_local_id + 1),
            wal_path,
            wal_file: Mutex::new(Some(wal_file)),
            _lock: lock,
        })
    }

    /// This replica's id, used to stamp origin keys on locally authored tessellae.
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    async fn append_line(&self, record: WalRecord) -> SmaragdaResult<()> {
        let checksum = checksum_of(&record)?;
        let line = WalLine { record, checksum };
        let serialized = serde_json::to_string(&line)?;

        let mut guard = self.wal_file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| SmaragdaError::StorageError("WAL file not open".to_string()))?;
        file.write_all(serialized.as_bytes())
            .await
            .map_err(|e| SmaragdaError::StorageError(format!("failed to write WAL: {e}")))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| SmaragdaError::StorageError(format!("failed to write WAL: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| SmaragdaError::StorageError(format!("failed to sync WAL: {e}")))?;
        Ok(())
    }

    /// Durably record a newly created res.
    pub async fn create_res(&self, res: Res) -> SmaragdaResult<()> {
        self.append_line(WalRecord::ResCreated { res: res.clone() })
            .await?;
        self.res_table.insert(res.id, res);
        Ok(())
    }

    /// Look up a res by id.
    pub fn get_res(&self, id: Id) -> SmaragdaResult<Res> {
        self.res_table
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "res",
                id: id.to_string(),
            })
    }

    /// Whether a res with this id exists.
    pub fn res_exists(&self, id: Id) -> bool {
        self.res_table.contains_key(&id)
    }

    /// Mint and durably append a new tessella for `res_id`, stamped with a
    /// fresh monotonic local id and the current time. The returned tessella
    /// carries an [`OriginKey`] scoped to this replica.
    pub async fn append_tessella(
        &self,
        res_id: Id,
        branch_id: Id,
        data: TessellaType,
        source: impl Into<String>,
    ) -> SmaragdaResult<Tessella> {
        let local_id = self.next_local_id.fetch_add(1, Ordering::SeqCst);
        let tessella = Tessella {
            id: local_id,
            res_id,
            branch_id,
            data,
            created_at: Utc::now(),
            source: source.into(),
            origin: OriginKey::new(self.replica_id, local_id),
        };
        self.append_line(WalRecord::TessellaAppended {
            tessella: tessella.clone(),
        })
        .await?;
        self.tessellae_by_res
            .entry(res_id)
            .or_default()
            .push(tessella.clone());
        self.by_origin.insert(tessella.origin, tessella.clone());
        debug!(res_id = %res_id, local_id, "appended tessella");
        Ok(tessella)
    }

    /// Ingest a tessella received from sync: assigns a fresh local id (this
    /// replica's own id space) while preserving the originating replica's
    /// `origin` key and `created_at` verbatim, per the ingest rule that a
    /// tessella's local id is only ever meaningful to the replica that
    /// assigned it. Idempotent: re-ingesting an already-seen origin key
    /// returns the previously stored tessella unchanged rather than
    /// appending a duplicate.
    pub async fn ingest_tessella(
        &self,
        res_id: Id,
        branch_id: Id,
        data: TessellaType,
        created_at: chrono::DateTime<Utc>,
        origin: OriginKey,
        source: impl Into<String>,
    ) -> SmaragdaResult<Tessella> {
        if let Some(existing) = self.by_origin.get(&origin) {
            return Ok(existing.clone());
        }
        let local_id = self.next_local_id.fetch_add(1, Ordering::SeqCst);
        let tessella = Tessella {
            id: local_id,
            res_id,
            branch_id,
            data,
            created_at,
            source: source.into(),
            origin,
        };
        self.append_line(WalRecord::TessellaAppended {
            tessella: tessella.clone(),
        })
        .await?;
        self.tessellae_by_res
            .entry(res_id)
            .or_default()
            .push(tessella.clone());
        self.by_origin.insert(origin, tessella.clone());
        Ok(tessella)
    }

    /// Whether a tessella with this origin key has already been recorded
    /// locally (append or ingest).
    pub fn has_origin(&self, origin: OriginKey) -> bool {
        self.by_origin.contains_key(&origin)
    }

    /// All tessellae for a res, in append order.
    pub fn scan_tessellae(&self, res_id: Id) -> Vec<Tessella> {
        self.tessellae_by_res
            .get(&res_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Every res id ever created, in no particular order.
    pub fn all_res_ids(&self) -> Vec<Id> {
        self.res_table.iter().map(|e| *e.key()).collect()
    }

    /// Every tessella across every res whose local id is strictly greater
    /// than `since`, in ascending local-id order. Used by the sync engine
    /// to answer a pull request.
    pub fn tessellae_since(&self, since: LocalId) -> Vec<Tessella> {
        let mut out: Vec<Tessella> = self
            .tessellae_by_res
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|t| t.id > since)
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// The highest local tessella id this replica has assigned, i.e. the
    /// local high-water mark advertised to sync peers.
    pub fn local_high_water_mark(&self) -> LocalId {
        self.next_local_id.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Path to the WAL file on disk (diagnostic/test use).
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Res;

    #[tokio::test]
    async fn append_and_scan_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path(), ReplicaId::new()).await.unwrap();
        let branch = Id::new();
        let genus = Id::new();
        let res = Res::new(genus, branch);
        store.create_res(res.clone()).await.unwrap();

        store
            .append_tessella(
                res.id,
                branch,
                TessellaType::AttributeSet {
                    key: "hostname".into(),
                    value: crate::types::AttributeValue::Text("db-1".into()),
                },
                "local",
            )
            .await
            .unwrap();
        store
            .append_tessella(
                res.id,
                branch,
                TessellaType::StatusTransition {
                    from: "provisioning".into(),
                    to: "active".into(),
                },
                "local",
            )
            .await
            .unwrap();

        let scanned = store.scan_tessellae(res.id);
        assert_eq!(scanned.len(), 2);
        assert!(scanned[0].id < scanned[1].id);
    }

    #[tokio::test]
    async fn reopening_replays_the_wal() {
        let dir = tempfile::tempdir().unwrap();
        let replica = ReplicaId::new();
        let res_id;
        {
            let store = LogStore::open(dir.path(), replica).await.unwrap();
            let res = Res::new(Id::new(), Id::new());
            res_id = res.id;
            store.create_res(res.clone()).await.unwrap();
            store
                .append_tessella(res.id, res.branch_id, TessellaType::Deprecated, "local")
                .await
                .unwrap();
        }
        let reopened = LogStore::open(dir.path(), replica).await.unwrap();
        assert!(reopened.res_exists(res_id));
        assert_eq!(reopened.scan_tessellae(res_id).len(), 1);
        assert_eq!(reopened.local_high_water_mark(), 1);
    }

    #[tokio::test]
    async fn second_open_of_same_db_is_rejected_while_first_is_live() {
        let dir = tempfile::tempdir().unwrap();
        let _first = LogStore::open(dir.path(), ReplicaId::new()).await.unwrap();
        let second = LogStore::open(dir.path(), ReplicaId::new()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn tessellae_since_filters_and_orders_by_local_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::open(dir.path(), ReplicaId::new()).await.unwrap();
        let res = Res::new(Id::new(), Id::new());
        store.create_res(res.clone()).await.unwrap();
        for _ in 0..3 {
            store
                .append_tessella(res.id, res.branch_id, TessellaType::Deprecated, "local")
                .await
                .unwrap();
        }
        let since = store.tessellae_since(1);
        assert_eq!(since.len(), 2);
        assert!(since[0].id < since[1].id);
    }
}
