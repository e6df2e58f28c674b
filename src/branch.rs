//! The branch manager: named isolation scopes for tessellae.
//!
//! A branch is a lightweight handle that resolves lazily against the
//! shared log rather than copying data, so forking is O(1). Merge walks
//! every res touched only on the source side since divergence and diffs
//! its materialized attributes against the target.
use crate::error::{MergeConflict, SmaragdaError, SmaragdaResult};
use crate::ids::Id;
use crate::materializer::{self, EntityState, MaterializeOptions};
use crate::store::LogStore;
use crate::types::{AttributeValue, Branch, BranchStatus, TessellaType};
use dashmap::DashMap;
use std::collections::HashMap;

/// Manages the branch table and answers branch-chain/ancestry queries.
/// Branch records live in an in-memory `DashMap` rather than the tessella
/// log (a branch is metadata about the log, not an event within it).
pub struct BranchManager {
    branches: DashMap<Id, Branch>,
}

impl BranchManager {
    /// Construct a manager seeded with the root `main` branch.
    pub fn new() -> (Self, Id) {
        let main = Branch {
            id: Id::new(),
            name: "main".to_string(),
            parent: None,
            created_at: chrono::Utc::now(),
            status: BranchStatus::Active,
        };
        let main_id = main.id;
        let branches = DashMap::new();
        branches.insert(main_id, main);
        (Self { branches }, main_id)
    }

    /// Look up a branch by id.
    pub fn get(&self, id: Id) -> SmaragdaResult<Branch> {
        self.branches
            .get(&id)
            .map(|b| b.clone())
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "branch",
                id: id.to_string(),
            })
    }

    /// Find a branch by display name.
    pub fn find_by_name(&self, name: &str) -> Option<Id> {
        self.branches
            .iter()
            .find(|e| e.value().name == name)
            .map(|e| *e.key())
    }

    /// Fork a new branch from `from`.
    pub fn create_branch(&self, name: impl Into<String>, from: Id) -> SmaragdaResult<Id> {
        if !self.branches.contains_key(&from) {
            return Err(SmaragdaError::NotFound {
                kind: "branch",
                id: from.to_string(),
            });
        }
        let branch = Branch {
            id: Id::new(),
            name: name.into(),
            parent: Some(from),
            created_at: chrono::Utc::now(),
            status: BranchStatus::Active,
        };
        let id = branch.id;
        self.branches.insert(id, branch);
        Ok(id)
    }

    /// The full ancestor chain of `branch_id`, including itself: the set
    /// of branch ids whose tessellae a materialization on `branch_id`
    /// includes.
    pub fn ancestors(&self, branch_id: Id) -> SmaragdaResult<std::collections::HashSet<Id>> {
        let mut chain = std::collections::HashSet::new();
        let mut current = branch_id;
        loop {
            if !chain.insert(current) {
                break; // defensive: a cycle should never occur, but never loop forever.
            }
            match self.get(current)?.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(chain)
    }

    /// Materialize `res_id` as of `branch_id` (including all ancestors).
    pub fn materialize_chain(
        &self,
        store: &LogStore,
        res_id: Id,
        branch_id: Id,
    ) -> SmaragdaResult<EntityState> {
        let chain = self.ancestors(branch_id)?;
        let tessellae = store.scan_tessellae(res_id);
        Ok(materializer::materialize(
            &tessellae,
            &MaterializeOptions {
                up_to: None,
                branches: Some(chain),
            },
        ))
    }

    /// Merge `source` into `target`.
    ///
    /// Walks every res touched on `source` since the branch point and, for
    /// each attribute, compares the value materialized on `source` against
    /// the value materialized on `target`. A conflict is any attribute
    /// both branches set (to different values) since diverging. Without
    /// `force`, a non-empty conflict set fails the merge with
    /// [`SmaragdaError::ConflictDetected`]; with `force`, source values
    /// win and an `attribute_set` tessella is appended on `target` for
    /// every conflicting key.
    pub async fn merge(
        &self,
        store: &LogStore,
        source: Id,
        target: Id,
        force: bool,
    ) -> SmaragdaResult<Vec<MergeConflict>> {
        let source_chain = self.ancestors(source)?;
        let target_chain = self.ancestors(target)?;

        let source_only_res: Vec<Id> = store
            .all_res_ids()
            .into_iter()
            .filter(|id| {
                store
                    .scan_tessellae(*id)
                    .iter()
                    .any(|t| source_chain.contains(&t.branch_id) && !target_chain.contains(&t.branch_id))
            })
            .collect();

        let mut conflicts = Vec::new();
        for res_id in &source_only_res {
            let tessellae = store.scan_tessellae(*res_id);
            let source_state = materializer::materialize(
                &tessellae,
                &MaterializeOptions {
                    up_to: None,
                    branches: Some(source_chain.clone()),
                },
            );
            let target_state = materializer::materialize(
                &tessellae,
                &MaterializeOptions {
                    up_to: None,
                    branches: Some(target_chain.clone()),
                },
            );

            for (key, source_value) in &source_state.attributes {
                if let Some(target_value) = target_state.attributes.get(key) {
                    if target_value != source_value
                        && attribute_set_since_divergence(&tessellae, &target_chain, key)
                    {
                        conflicts.push(MergeConflict {
                            res_id: res_id.to_string(),
                            key: key.clone(),
                            source_value: attribute_to_json(source_value),
                            target_value: attribute_to_json(target_value),
                        });
                    }
                }
            }
        }

        if !conflicts.is_empty() && !force {
            return Err(SmaragdaError::ConflictDetected(conflicts));
        }

        if force {
            for conflict in &conflicts {
                let res_id: Id = conflict
                    .res_id
                    .parse()
                    .map_err(|_| SmaragdaError::StorageError("corrupt res id in conflict".into()))?;
                let tessellae = store.scan_tessellae(res_id);
                let source_state = materializer::materialize(
                    &tessellae,
                    &MaterializeOptions {
                        up_to: None,
                        branches: Some(source_chain.clone()),
                    },
                );
                if let Some(value) = source_state.attributes.get(&conflict.key) {
                    store
                        .append_tessella(
                            res_id,
                            target,
                            TessellaType::AttributeSet {
                                key: conflict.key.clone(),
                                value: value.clone(),
                            },
                            "merge",
                        )
                        .await?;
                }
            }
        }

        if force || conflicts.is_empty() {
            if let Some(mut branch) = self.branches.get_mut(&source) {
                branch.status = BranchStatus::Merged;
            }
        }

        Ok(conflicts)
    }

    /// Diff the materialized state of `res_id` on branches `a` and `b`.
    pub fn compare_branches(
        &self,
        store: &LogStore,
        res_id: Id,
        a: Id,
        b: Id,
    ) -> SmaragdaResult<HashMap<String, (Option<AttributeValue>, Option<AttributeValue>)>> {
        let state_a = self.materialize_chain(store, res_id, a)?;
        let state_b = self.materialize_chain(store, res_id, b)?;
        let mut diff = HashMap::new();
        let keys: std::collections::HashSet<&String> =
            state_a.attributes.keys().chain(state_b.attributes.keys()).collect();
        for key in keys {
            let va = state_a.attributes.get(key).cloned();
            let vb = state_b.attributes.get(key).cloned();
            if va != vb {
                diff.insert(key.clone(), (va, vb));
            }
        }
        Ok(diff)
    }
}

impl Default for BranchManager {
    fn default() -> Self {
        Self::new().0
    }
}

fn attribute_set_since_divergence(
    tessellae: &[crate::types::Tessella],
    target_chain: &std::collections::HashSet<Id>,
    key: &str,
) -> bool {
    tessellae.iter().any(|t| {
        target_chain.contains(&t.branch_id)
            && matches!(&t.data, TessellaType::AttributeSet { key: k, .. } if k == key)
    })
}

fn attribute_to_json(value: &AttributeValue) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
