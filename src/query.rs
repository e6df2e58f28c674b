//! The query layer: read-side operations over materialized res.
//!
//! `Filter` is built through `eq`/`gt`/`lt`/`contains`-style associated
//! functions and evaluated against a materialized attribute map. Listing,
//! search, history, relationship lookup, and timeline queries each
//! materialize on demand rather than maintaining a separate read index.
use crate::branch::BranchManager;
use crate::genus::GenusRegistry;
use crate::ids::Id;
use crate::materializer::{self, EntityState, MaterializeOptions};
use crate::store::LogStore;
use crate::types::{AttributeValue, Tessella};
use serde::{Deserialize, Serialize};

/// A predicate over a single attribute, used by [`listEntities`](QueryExecutor::list_entities).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Filter {
    /// Attribute equals value.
    Eq { key: String, value: AttributeValue },
    /// Attribute not equal to value.
    Ne { key: String, value: AttributeValue },
    /// Numeric attribute greater than value.
    Gt { key: String, value: f64 },
    /// Numeric attribute greater than or equal to value.
    Gte { key: String, value: f64 },
    /// Numeric attribute less than value.
    Lt { key: String, value: f64 },
    /// Numeric attribute less than or equal to value.
    Lte { key: String, value: f64 },
    /// Text attribute contains `needle`, case-insensitively.
    Contains { key: String, needle: String },
    /// Logical AND of filters.
    And(Vec<Filter>),
    /// Logical OR of filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Equality filter.
    pub fn eq(key: impl Into<String>, value: AttributeValue) -> Self {
        Self::Eq { key: key.into(), value }
    }

    /// Inequality filter.
    pub fn ne(key: impl Into<String>, value: AttributeValue) -> Self {
        Self::Ne { key: key.into(), value }
    }

    /// Greater-than filter over a numeric attribute.
    pub fn gt(key: impl Into<String>, value: f64) -> Self {
        Self::Gt { key: key.into(), value }
    }

    /// Substring filter over a text attribute.
    pub fn contains(key: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            key: key.into(),
            needle: needle.into(),
        }
    }

    fn numeric_of(value: &AttributeValue) -> Option<f64> {
        match value {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Evaluate this filter against a materialized attribute map.
    pub fn matches(&self, state: &EntityState) -> bool {
        match self {
            Filter::Eq { key, value } => state.attributes.get(key) == Some(value),
            Filter::Ne { key, value } => state.attributes.get(key) != Some(value),
            Filter::Gt { key, value } => state
                .attributes
                .get(key)
                .and_then(Self::numeric_of)
                .is_some_and(|v| v > *value),
            Filter::Gte { key, value } => state
                .attributes
                .get(key)
                .and_then(Self::numeric_of)
                .is_some_and(|v| v >= *value),
            Filter::Lt { key, value } => state
                .attributes
                .get(key)
                .and_then(Self::numeric_of)
                .is_some_and(|v| v < *value),
            Filter::Lte { key, value } => state
                .attributes
                .get(key)
                .and_then(Self::numeric_of)
                .is_some_and(|v| v <= *value),
            Filter::Contains { key, needle } => state
                .attributes
                .get(key)
                .is_some_and(|v| v.contains_ignore_case(needle)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(state)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(state)),
            Filter::Not(inner) => !inner.matches(state),
        }
    }
}

/// A compact summary of a res, for `listEntities({compact: true})`.
#[derive(Debug, Clone, Serialize)]
pub struct CompactEntity {
    /// The res id.
    pub id: Id,
    /// Its genus.
    pub genus_id: Id,
    /// Its materialized status, if any.
    pub status: Option<String>,
    /// Its `name` attribute, if set and text-typed.
    pub name: Option<String>,
}

/// A single changed field recorded at one point of a res's history, as
/// returned by `get_history(diff=true)`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryDiffEntry {
    /// The tessella that produced this diff entry.
    pub tessella_id: u64,
    /// What kind of event it was.
    pub kind: &'static str,
    /// A short human-readable description of what changed.
    pub change: String,
}

/// Read-side operations over a store/registry/branch-manager triple.
pub struct QueryExecutor<'a> {
    store: &'a LogStore,
    registry: &'a GenusRegistry,
    branches: &'a BranchManager,
}

impl<'a> QueryExecutor<'a> {
    /// Construct a query executor.
    pub fn new(store: &'a LogStore, registry: &'a GenusRegistry, branches: &'a BranchManager) -> Self {
        Self {
            store,
            registry,
            branches,
        }
    }

    fn materialize_on(&self, res_id: Id, branch_id: Id) -> crate::error::SmaragdaResult<EntityState> {
        self.branches.materialize_chain(self.store, res_id, branch_id)
    }

    /// List res of `genus_id` (or every res, if `None`) materialized on
    /// `branch_id`, optionally filtered. `compact` selects the summary
    /// projection over the full state map.
    pub fn list_entities(
        &self,
        genus_id: Option<Id>,
        branch_id: Id,
        filter: Option<&Filter>,
        compact: bool,
    ) -> crate::error::SmaragdaResult<Vec<EntityListItem>> {
        let mut out = Vec::new();
        for id in self.store.all_res_ids() {
            let res = self.store.get_res(id)?;
            if let Some(genus_id) = genus_id {
                if res.genus_id != genus_id {
                    continue;
                }
            }
            let state = self.materialize_on(id, branch_id)?;
            if let Some(filter) = filter {
                if !filter.matches(&state) {
                    continue;
                }
            }
            out.push(if compact {
                EntityListItem::Compact(CompactEntity {
                    id,
                    genus_id: res.genus_id,
                    status: state.status.clone(),
                    name: state.attributes.get("name").and_then(|v| match v {
                        AttributeValue::Text(s) => Some(s.clone()),
                        _ => None,
                    }),
                })
            } else {
                EntityListItem::Full(id, state)
            });
        }
        Ok(out)
    }

    /// Materialize every res (on `branch_id`) and yield those with any
    /// string-typed attribute containing `query` case-insensitively.
    pub fn search_entities(
        &self,
        branch_id: Id,
        query: &str,
    ) -> crate::error::SmaragdaResult<Vec<(Id, EntityState)>> {
        let mut out = Vec::new();
        for id in self.store.all_res_ids() {
            let state = self.materialize_on(id, branch_id)?;
            if state.attributes.values().any(|v| v.contains_ignore_case(query)) {
                out.push((id, state));
            }
        }
        Ok(out)
    }

    /// The raw tessella sequence for a res, oldest first.
    pub fn get_history(&self, res_id: Id, diff: bool) -> Vec<HistoryItem> {
        let tessellae = self.store.scan_tessellae(res_id);
        if !diff {
            return tessellae.into_iter().map(HistoryItem::Raw).collect();
        }
        tessellae
            .into_iter()
            .map(|t| HistoryItem::Diff(describe_change(&t)))
            .collect()
    }

    /// Every relationship res that links `entity_id` (optionally only in
    /// `role`), with their materialized state.
    pub fn get_relationships(
        &self,
        entity_id: Id,
        role: Option<&str>,
        branch_id: Id,
    ) -> crate::error::SmaragdaResult<Vec<(Id, EntityState)>> {
        let mut out = Vec::new();
        for id in self.store.all_res_ids() {
            let res = self.store.get_res(id)?;
            if self.registry.get(res.genus_id).ok().map(|g| matches!(g, crate::genus::Genus::Relationship(_))) != Some(true) {
                continue;
            }
            let state = self.materialize_on(id, branch_id)?;
            let links = match role {
                Some(role) => state
                    .relationships
                    .get(role)
                    .map(|ids| ids.contains(&entity_id))
                    .unwrap_or(false),
                None => state.relationships.values().any(|ids| ids.contains(&entity_id)),
            };
            if links {
                out.push((id, state));
            }
        }
        Ok(out)
    }

    /// Res whose `temporal_anchor` intersects `[start_year, end_year]`,
    /// sorted ascending by anchor start year.
    pub fn query_timeline(
        &self,
        start_year: i32,
        end_year: i32,
        branch_id: Id,
    ) -> crate::error::SmaragdaResult<Vec<(Id, EntityState)>> {
        let mut out = Vec::new();
        for id in self.store.all_res_ids() {
            let state = self.materialize_on(id, branch_id)?;
            if let Some((anchor_start, anchor_end)) = state.temporal_anchor {
                if anchor_start <= end_year && anchor_end >= start_year {
                    out.push((id, state));
                }
            }
        }
        out.sort_by_key(|(_, state)| state.temporal_anchor.map(|(s, _)| s).unwrap_or(0));
        Ok(out)
    }

    /// Materialize `res_id` as of a specific tessella id (point-in-time).
    pub fn materialize_at(
        &self,
        res_id: Id,
        up_to: u64,
        branch_id: Id,
    ) -> crate::error::SmaragdaResult<EntityState> {
        let chain = self.branches.ancestors(branch_id)?;
        let tessellae = self.store.scan_tessellae(res_id);
        Ok(materializer::materialize(
            &tessellae,
            &MaterializeOptions {
                up_to: Some(up_to),
                branches: Some(chain),
            },
        ))
    }
}

/// A `listEntities` result row: either the compact summary or full state.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EntityListItem {
    /// The `{id, genus, status, name}` summary projection.
    Compact(CompactEntity),
    /// The full `(id, state)` pair.
    Full(Id, EntityState),
}

// `EntityState` carries no `Serialize` derive of its own in `materializer`
// (it's an internal fold accumulator); this impl exists solely so
// `EntityListItem::Full`/`HistoryItem` can cross the HTTP boundary when a
// caller asks for the full (non-compact) projection.
impl Serialize for EntityState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("EntityState", 6)?;
        s.serialize_field("attributes", &self.attributes)?;
        s.serialize_field("status", &self.status)?;
        s.serialize_field("features", &self.features)?;
        s.serialize_field("relationships", &self.relationships)?;
        s.serialize_field("temporal_anchor", &self.temporal_anchor)?;
        s.serialize_field("workspace", &self.workspace)?;
        s.serialize_field("deprecated", &self.deprecated)?;
        s.serialize_field("state_machine_drift", &self.state_machine_drift)?;
        s.end()
    }
}

/// A `get_history` result row: either the raw tessella or a change summary.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HistoryItem {
    /// The tessella verbatim.
    Raw(Tessella),
    /// A change summary, for `diff=true`.
    Diff(HistoryDiffEntry),
}

fn describe_change(t: &Tessella) -> HistoryDiffEntry {
    use crate::types::TessellaType::*;
    let change = match &t.data {
        AttributeSet { key, value } => format!("{key} = {value:?}"),
        StatusTransition { from, to } => format!("status: {from} -> {to}"),
        FeatureAdded { feature_res_id } => format!("feature added: {feature_res_id}"),
        RelationshipLinked { role, other_res_id } => format!("{role}: linked {other_res_id}"),
        ActionApplied { action_genus_id, .. } => format!("action applied: {action_genus_id}"),
        TemporalAnchorSet { start_year, end_year } => {
            format!("anchored: {start_year}..={end_year}")
        }
        AssignWorkspace { workspace } => format!("workspace = {workspace}"),
        Deprecated => "deprecated".to_string(),
    };
    HistoryDiffEntry {
        tessella_id: t.id,
        kind: t.data.kind(),
        change,
    }
}
