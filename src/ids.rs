//! Identity service.
//!
//! Every res, tessella, genus, branch, and workspace in Smaragda is named
//! by a 26-character [ULID](https://github.com/ulid/spec): lexicographically
//! sortable by creation time, globally unique without coordination. A
//! time-sortable scheme is used rather than a random UUID because replay
//! order and high-water-mark bookkeeping both care about "when was this
//! minted".
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// A globally unique, time-sortable identifier.
///
/// Used for res, genus, branch, and workspace ids. Tessella ids are plain
/// monotonic `u64`s scoped to a single replica (see [`crate::types::LocalId`]);
/// `Id` is for anything that must be unique *across* replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Ulid);

impl Id {
    /// Mint a fresh id from the current time.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Wrap an existing ULID (used when reconstructing ids from storage).
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

/// Identifies a replica (a single running Smaragda instance) for sync
/// origin-key bookkeeping. A fresh `ReplicaId` is minted the first time a
/// database is opened and persisted alongside it thereafter (see
/// [`crate::config::Config`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Id);

impl ReplicaId {
    /// Mint a fresh replica id.
    pub fn new() -> Self {
        Self(Id::new())
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReplicaId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Id::from_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_lexicographically_sortable_by_creation_order() {
        let a = Id::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Id::new();
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn id_round_trips_through_string() {
        let id = Id::new();
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn replica_id_round_trips_through_string() {
        let id = ReplicaId::new();
        let parsed: ReplicaId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
