//! Common types used throughout the Smaragda kernel.
//!
//! This module defines the core data structures of the kernel's internal
//! model: identities (`Res`), events (`Tessella`), the tagged attribute
//! value sum, and branches. These types are designed to be simple,
//! immutable, and serializable without ceremony, carrying their own
//! accessor methods rather than leaking storage details to callers.
use crate::ids::{Id, ReplicaId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A tessella id: monotonically increasing within a single replica.
///
/// Unlike [`Id`] (globally unique, time-sortable across replicas), a
/// `LocalId` only has meaning relative to the replica that assigned it —
/// two replicas' tessella #42 are unrelated events.
pub type LocalId = u64;

/// The cross-replica identity of a tessella: basis of ingest idempotency.
///
/// For a locally authored tessella, `replica` is this process's own
/// [`ReplicaId`] and `local_id` is the id the log store assigned it. When a
/// tessella is ingested from a peer, the origin key is preserved verbatim
/// so re-ingesting the same event (from the same peer or transitively from
/// a third replica) is recognized as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginKey {
    /// The replica that authored this tessella.
    pub replica: ReplicaId,
    /// The id the authoring replica assigned it.
    pub local_id: LocalId,
}

impl OriginKey {
    /// Construct an origin key.
    pub fn new(replica: ReplicaId, local_id: LocalId) -> Self {
        Self { replica, local_id }
    }
}

impl PartialOrd for OriginKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OriginKey {
    /// Lexicographic order on `(replica, local_id)`, used as the
    /// `created_at`-tie tiebreak for "last write wins".
    fn cmp(&self, other: &Self) -> Ordering {
        self.replica
            .to_string()
            .cmp(&other.replica.to_string())
            .then(self.local_id.cmp(&other.local_id))
    }
}

/// A declared attribute value, tagged by the semantic type the genus
/// assigned to its key. Dynamic schemas (genera are data, not Rust types)
/// are represented this way rather than as a bare [`serde_json::Value`] so
/// validation at the mutation boundary has something precise to check
/// against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Free text.
    Text(String),
    /// Floating point number.
    Number(f64),
    /// Whole number.
    Integer(i64),
    /// Boolean flag.
    Boolean(bool),
    /// One of a declared set of choices.
    Enum(String),
    /// A point in time.
    Timestamp(DateTime<Utc>),
    /// A reference to another res (constrained to a declared genus).
    Ref(Id),
}

impl AttributeValue {
    /// The semantic type name, used in validation error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Text(_) => "text",
            AttributeValue::Number(_) => "number",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Enum(_) => "enum",
            AttributeValue::Timestamp(_) => "timestamp",
            AttributeValue::Ref(_) => "reference",
        }
    }

    /// Substring search support: does this value, read as text, contain
    /// `needle` case-insensitively? Non-text-bearing variants never match.
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        let haystack = match self {
            AttributeValue::Text(s) | AttributeValue::Enum(s) => s.clone(),
            _ => return false,
        };
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// An entity identity. A res carries no state of its own — state is always
/// reconstructed by folding its tessellae (see [`crate::materializer`]).
/// Created once; never mutated; never physically deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Res {
    /// Globally unique id.
    pub id: Id,
    /// The genus (schema) this res was created under.
    pub genus_id: Id,
    /// The branch this res was created on.
    pub branch_id: Id,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Res {
    /// Construct a new res with a freshly minted id.
    pub fn new(genus_id: Id, branch_id: Id) -> Self {
        Self {
            id: Id::new(),
            genus_id,
            branch_id,
            created_at: Utc::now(),
        }
    }
}

/// The discriminated union of event payloads a tessella can carry. Every
/// fold step in [`crate::materializer`] matches exhaustively over this
/// enum; adding a variant without adding a fold arm is a compile error by
/// construction, which is the enforcement mechanism for "materialization
/// never silently ignores a known event type" (unknown *wire* types, e.g.
/// from a newer replica, are a separate, explicitly logged case — see
/// [`crate::materializer::fold`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TessellaType {
    /// Sets (or overwrites) a single declared attribute.
    AttributeSet {
        /// The attribute key (must be declared on the res's genus).
        key: String,
        /// The new value.
        value: AttributeValue,
    },
    /// Moves the res's status along a declared state-machine edge.
    StatusTransition {
        /// The status materialized immediately before this tessella.
        from: String,
        /// The status this tessella moves to.
        to: String,
    },
    /// Links a feature res to its parent.
    FeatureAdded {
        /// The feature res that was attached.
        feature_res_id: Id,
    },
    /// Records that a relationship res references an entity in a named role.
    RelationshipLinked {
        /// The role name declared on the relationship genus.
        role: String,
        /// The res filling that role.
        other_res_id: Id,
    },
    /// Records that an action genus was applied to this res.
    ActionApplied {
        /// The action genus that was applied.
        action_genus_id: Id,
        /// Opaque action payload (action genera don't declare typed attributes).
        payload: serde_json::Value,
    },
    /// Anchors a res to a historical time range.
    TemporalAnchorSet {
        /// Start year; negative denotes BC.
        start_year: i32,
        /// End year; negative denotes BC.
        end_year: i32,
    },
    /// Tags a res with a workspace.
    AssignWorkspace {
        /// The workspace tag.
        workspace: String,
    },
    /// Logically retires a res. Never physically deletes it.
    Deprecated,
}

impl TessellaType {
    /// The wire/storage discriminant, used in log messages and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            TessellaType::AttributeSet { .. } => "attribute_set",
            TessellaType::StatusTransition { .. } => "status_transition",
            TessellaType::FeatureAdded { .. } => "feature_added",
            TessellaType::RelationshipLinked { .. } => "relationship_linked",
            TessellaType::ActionApplied { .. } => "action_applied",
            TessellaType::TemporalAnchorSet { .. } => "temporal_anchor_set",
            TessellaType::AssignWorkspace { .. } => "assign_workspace",
            TessellaType::Deprecated => "deprecated",
        }
    }
}

/// An immutable event appended to the log: the atomic unit of history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tessella {
    /// Monotonic id within this replica.
    pub id: LocalId,
    /// The res this event happened to.
    pub res_id: Id,
    /// The branch this event was appended on.
    pub branch_id: Id,
    /// The event payload.
    pub data: TessellaType,
    /// When this event was created (the authoring replica's clock).
    pub created_at: DateTime<Utc>,
    /// Free-form provenance tag: `"local"`, `"sync:<peer>"`, etc.
    pub source: String,
    /// Cross-replica identity, basis of ingest idempotency.
    pub origin: OriginKey,
}

/// A named isolation scope for tessellae.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Globally unique id.
    pub id: Id,
    /// Display name (e.g. `"main"`, `"feature/pricing"`).
    pub name: String,
    /// The branch this one was forked from (`None` only for the root `main`).
    pub parent: Option<Id>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: BranchStatus,
}

/// The lifecycle status of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    /// Accepting new tessellae.
    Active,
    /// Merged into another branch; retained for history.
    Merged,
    /// Abandoned without merging.
    Abandoned,
}
