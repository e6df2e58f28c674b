//! The materializer: a pure fold from a tessella sequence to current state.
//!
//! Folding history down to a single current value happens by exhaustive
//! match over the event enum: one arm per variant, so a new variant without
//! a fold arm is a compile error rather than a silently ignored case.
use crate::genus::GenusRegistry;
use crate::ids::Id;
use crate::types::{AttributeValue, OriginKey, Tessella, TessellaType};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Options narrowing which tessellae a materialization considers.
#[derive(Debug, Clone, Default)]
pub struct MaterializeOptions {
    /// Only fold tessellae with `id <= up_to` (point-in-time query).
    pub up_to: Option<u64>,
    /// Only fold tessellae whose `branch_id` is in this set (the branch
    /// being queried plus its ancestors). `None` means no branch filter —
    /// all branches are included.
    pub branches: Option<HashSet<Id>>,
}

/// The materialized state of a res: the output of folding its tessellae.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    /// Current attribute values, keyed by attribute name.
    pub attributes: HashMap<String, AttributeValue>,
    /// Current status, if the res's genus has a state machine and a
    /// `status_transition` has ever been applied.
    pub status: Option<String>,
    /// Feature res ids attached to this res.
    pub features: HashSet<Id>,
    /// Relationship roles this res fills, keyed by role name.
    pub relationships: HashMap<String, Vec<Id>>,
    /// Historical time range, if anchored.
    pub temporal_anchor: Option<(i32, i32)>,
    /// Workspace tag, if assigned.
    pub workspace: Option<String>,
    /// Whether `deprecated` has been applied.
    pub deprecated: bool,
    /// Set when a `status_transition` was folded whose `from` didn't match
    /// the state materialized immediately before it. The tessella is still
    /// accepted and folded, never dropped, but this flag surfaces the
    /// mismatch for an operator to investigate.
    pub state_machine_drift: bool,
    /// `(created_at, origin)` of the tessella that last set each attribute,
    /// kept to resolve "last write wins" deterministically across folds of
    /// the same prefix on different replicas.
    last_write: HashMap<String, (DateTime<Utc>, OriginKey)>,
}

/// Fold `tessellae` into current state, honoring `opts`. Two replicas that
/// hold the same filtered tessella set always produce an equal
/// [`EntityState`]: tessellae are sorted into a canonical order —
/// `(created_at, origin)` — before folding, so the result never depends on
/// local arrival order, only on the set of tessellae each replica holds.
pub fn materialize(tessellae: &[Tessella], opts: &MaterializeOptions) -> EntityState {
    let mut filtered: Vec<&Tessella> = tessellae
        .iter()
        .filter(|t| opts.up_to.map(|bound| t.id <= bound).unwrap_or(true))
        .filter(|t| {
            opts.branches
                .as_ref()
                .map(|branches| branches.contains(&t.branch_id))
                .unwrap_or(true)
        })
        .collect();
    filtered.sort_by_key(|t| (t.created_at, t.origin));

    let mut state = EntityState::default();
    for tessella in filtered {
        apply(&mut state, tessella);
    }
    state
}

fn apply(state: &mut EntityState, tessella: &Tessella) {
    match &tessella.data {
        TessellaType::AttributeSet { key, value } => {
            let candidate = (tessella.created_at, tessella.origin);
            let should_write = match state.last_write.get(key) {
                Some(existing) => candidate >= *existing,
                None => true,
            };
            if should_write {
                state.attributes.insert(key.clone(), value.clone());
                state.last_write.insert(key.clone(), candidate);
            }
        }
        TessellaType::StatusTransition { from, to } => {
            if let Some(current) = &state.status {
                if current != from {
                    state.state_machine_drift = true;
                }
            }
            state.status = Some(to.clone());
        }
        TessellaType::FeatureAdded { feature_res_id } => {
            state.features.insert(*feature_res_id);
        }
        TessellaType::RelationshipLinked {
            role,
            other_res_id,
        } => {
            state
                .relationships
                .entry(role.clone())
                .or_default()
                .push(*other_res_id);
        }
        TessellaType::ActionApplied { .. } => {
            // Actions are logged history, not state — nothing to fold.
        }
        TessellaType::TemporalAnchorSet {
            start_year,
            end_year,
        } => {
            state.temporal_anchor = Some((*start_year, *end_year));
        }
        TessellaType::AssignWorkspace { workspace } => {
            state.workspace = Some(workspace.clone());
        }
        TessellaType::Deprecated => {
            state.deprecated = true;
        }
    }
}

/// The health of a materialized res: whether it satisfies its genus's
/// required-attribute contract and whether replay ever detected drift.
#[derive(Debug, Clone, PartialEq)]
pub struct Health {
    /// `true` iff every required attribute is set and no drift was detected.
    pub healthy: bool,
    /// Required attribute keys that are not currently set.
    pub missing_required: Vec<String>,
    /// Set when [`EntityState::state_machine_drift`] was flagged during fold.
    pub state_machine_drift: bool,
}

/// Compute the health of a materialized res against its genus's declared
/// required attributes.
pub fn get_health(
    registry: &GenusRegistry,
    genus_id: Id,
    state: &EntityState,
) -> crate::error::SmaragdaResult<Health> {
    let required = registry.required_attributes(genus_id)?;
    let missing_required: Vec<String> = required
        .into_iter()
        .filter(|key| !state.attributes.contains_key(key))
        .collect();
    Ok(Health {
        healthy: missing_required.is_empty() && !state.state_machine_drift,
        missing_required,
        state_machine_drift: state.state_machine_drift,
    })
}

/// Log (but do not fail on) a tessella whose `data` discriminant this
/// replica does not recognize. Kept as a named hook rather than inlined so
/// a future wire-format migration has one place to extend — currently
/// unreachable because [`TessellaType`] is matched exhaustively above, but
/// forward-compatible replicas need unknown types to be skipped and logged
/// rather than rejected outright once the enum grows a variant this
/// replica predates.
#[allow(dead_code)]
fn log_unknown_tessella(kind: &str, res_id: Id) {
    warn!(kind, res_id = %res_id, "skipping unknown tessella type");
}
