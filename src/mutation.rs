//! The mutation API: validated, tessella-appending operations on res.
//!
//! Each operation resolves the res and genus, validates, appends one or
//! more tessellae, and returns the freshly materialized state: validate,
//! then append, then return. `batch_update` collects per-item outcomes
//! before deciding whether to abort, the same way a batch write collects
//! every entry before a single commit.
use crate::error::{SmaragdaError, SmaragdaResult};
use crate::genus::{AttrType, Genus, GenusRegistry};
use crate::ids::Id;
use crate::materializer::{self, EntityState, MaterializeOptions};
use crate::store::LogStore;
use crate::types::{AttributeValue, Res, TessellaType};
use std::collections::HashSet;

/// A single declared-status or declared-attribute write, as accepted by
/// `batch_update`.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Set one attribute.
    SetAttribute { key: String, value: AttributeValue },
    /// Transition (possibly via multiple hops) to a target status.
    TargetStatus(String),
}

/// The target selection for a batch update: either an explicit list of
/// `(res_id, op)` pairs, or a `where` clause matching every res of a genus
/// whose materialized state satisfies an attribute equality predicate.
#[derive(Debug, Clone)]
pub enum BatchTarget {
    /// Explicit `(res_id, op)` pairs, applied in array order.
    Explicit(Vec<(Id, BatchOp)>),
    /// Every res of `genus_id` whose `attribute_filter` (if any) matches,
    /// each given the same `op`.
    Where {
        genus_id: Id,
        attribute_filter: Option<(String, AttributeValue)>,
        op: BatchOp,
    },
}

fn branch_filter(branches: Option<&HashSet<Id>>) -> Option<HashSet<Id>> {
    branches.cloned()
}

/// Bundles the log store and genus registry a mutation needs; cheap to
/// construct, holds only borrows.
pub struct Mutator<'a> {
    store: &'a LogStore,
    registry: &'a GenusRegistry,
}

impl<'a> Mutator<'a> {
    /// Construct a mutator over a store/registry pair.
    pub fn new(store: &'a LogStore, registry: &'a GenusRegistry) -> Self {
        Self { store, registry }
    }

    fn current_state(&self, res_id: Id, branches: Option<&HashSet<Id>>) -> EntityState {
        let tessellae = self.store.scan_tessellae(res_id);
        materializer::materialize(
            &tessellae,
            &MaterializeOptions {
                up_to: None,
                branches: branch_filter(branches),
            },
        )
    }

    fn validate_attributes(
        &self,
        genus_id: Id,
        attributes: &[(String, AttributeValue)],
    ) -> SmaragdaResult<()> {
        for (key, value) in attributes {
            self.registry.validate_attribute(genus_id, key, value)?;
            self.validate_reference(genus_id, key, value)?;
        }
        Ok(())
    }

    /// If `key` is declared as a `Ref` attribute, confirm `value` names a
    /// res that actually belongs to the declared target genus. The res
    /// table is only available here, not inside the registry.
    fn validate_reference(
        &self,
        genus_id: Id,
        key: &str,
        value: &AttributeValue,
    ) -> SmaragdaResult<()> {
        if let (Some(AttrType::Ref { genus_id: expected }), AttributeValue::Ref(referenced_id)) =
            (self.registry.attribute_type(genus_id, key)?, value)
        {
            let referenced = self.store.get_res(*referenced_id)?;
            if referenced.genus_id != expected {
                return Err(SmaragdaError::GenusMismatch {
                    res_id: referenced_id.to_string(),
                    expected_genus: expected.to_string(),
                    actual_genus: referenced.genus_id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Append the tessellae needed to move a res from `from` to `target`,
    /// auto-traversing multiple declared transitions when they're not
    /// directly adjacent.
    async fn drive_to_status(
        &self,
        res_id: Id,
        branch_id: Id,
        genus_id: Id,
        from: &str,
        target: &str,
    ) -> SmaragdaResult<()> {
        let path = self
            .registry
            .shortest_transition_path(genus_id, from, target)?;
        let mut current = from.to_string();
        for next in path {
            self.store
                .append_tessella(
                    res_id,
                    branch_id,
                    TessellaType::StatusTransition {
                        from: current.clone(),
                        to: next.clone(),
                    },
                    "local",
                )
                .await?;
            current = next;
        }
        Ok(())
    }

    /// Create a new entity res, set its initial attributes, and optionally
    /// auto-traverse to `target_status`.
    pub async fn create_entity(
        &self,
        genus_id: Id,
        branch_id: Id,
        attributes: Vec<(String, AttributeValue)>,
        target_status: Option<String>,
        branches: Option<&HashSet<Id>>,
    ) -> SmaragdaResult<(Id, EntityState)> {
        let genus = self.registry.get(genus_id)?;
        if genus.as_entity().is_none() {
            return Err(SmaragdaError::GenusMismatch {
                res_id: "(new)".to_string(),
                expected_genus: "entity".to_string(),
                actual_genus: genus_id.to_string(),
            });
        }
        self.validate_attributes(genus_id, &attributes)?;

        let res = Res::new(genus_id, branch_id);
        self.store.create_res(res.clone()).await?;

        let initial = self.registry.initial_state(genus_id)?;
        self.store
            .append_tessella(
                res.id,
                branch_id,
                TessellaType::StatusTransition {
                    from: String::new(),
                    to: initial.clone(),
                },
                "local",
            )
            .await?;

        for (key, value) in attributes {
            self.store
                .append_tessella(
                    res.id,
                    branch_id,
                    TessellaType::AttributeSet { key, value },
                    "local",
                )
                .await?;
        }

        if let Some(target) = target_status {
            if target != initial {
                self.drive_to_status(res.id, branch_id, genus_id, &initial, &target)
                    .await?;
            }
        }

        let state = self.current_state(res.id, branches);
        Ok((res.id, state))
    }

    /// Set a single attribute on an existing res.
    pub async fn set_attribute(
        &self,
        res_id: Id,
        branch_id: Id,
        key: String,
        value: AttributeValue,
        branches: Option<&HashSet<Id>>,
    ) -> SmaragdaResult<EntityState> {
        let res = self.store.get_res(res_id)?;
        self.registry.validate_attribute(res.genus_id, &key, &value)?;
        self.validate_reference(res.genus_id, &key, &value)?;
        self.store
            .append_tessella(
                res_id,
                branch_id,
                TessellaType::AttributeSet { key, value },
                "local",
            )
            .await?;
        Ok(self.current_state(res_id, branches))
    }

    /// Move a res directly to `to`. Fails with `InvalidTransition` unless
    /// `(current, to)` is a declared edge on the genus's state machine, and
    /// unless every attribute the edge `requires` is already set. Unlike
    /// `target_status` on `create_entity`/`batch_update`, this never
    /// auto-traverses multiple hops.
    pub async fn transition_status(
        &self,
        res_id: Id,
        branch_id: Id,
        to: String,
        branches: Option<&HashSet<Id>>,
    ) -> SmaragdaResult<EntityState> {
        let res = self.store.get_res(res_id)?;
        let state = self.current_state(res_id, branches);
        let current = state.status.clone().unwrap_or_default();
        let transition = self
            .registry
            .get_transition(res.genus_id, &current, &to)?
            .ok_or_else(|| SmaragdaError::InvalidTransition {
                genus_id: res.genus_id.to_string(),
                from: current.clone(),
                to: to.clone(),
            })?;
        for required_key in &transition.requires {
            if !state.attributes.contains_key(required_key) {
                return Err(SmaragdaError::ValidationError {
                    genus_id: res.genus_id.to_string(),
                    key: required_key.clone(),
                    reason: format!(
                        "required by transition from '{current}' to '{to}'"
                    ),
                });
            }
        }
        self.store
            .append_tessella(
                res_id,
                branch_id,
                TessellaType::StatusTransition {
                    from: current,
                    to,
                },
                "local",
            )
            .await?;
        Ok(self.current_state(res_id, branches))
    }

    /// Attach a new feature res to `parent_res_id`.
    pub async fn create_feature(
        &self,
        feature_genus_id: Id,
        parent_res_id: Id,
        branch_id: Id,
        attributes: Vec<(String, AttributeValue)>,
        branches: Option<&HashSet<Id>>,
    ) -> SmaragdaResult<(Id, EntityState)> {
        let genus = self.registry.get(feature_genus_id)?;
        let feature_genus = match &genus {
            Genus::Feature(g) => g,
            _ => {
                return Err(SmaragdaError::GenusMismatch {
                    res_id: "(new)".to_string(),
                    expected_genus: "feature".to_string(),
                    actual_genus: feature_genus_id.to_string(),
                })
            }
        };

        let parent = self.store.get_res(parent_res_id)?;
        if parent.genus_id != feature_genus.parent_entity_genus {
            return Err(SmaragdaError::GenusMismatch {
                res_id: parent_res_id.to_string(),
                expected_genus: feature_genus.parent_entity_genus.to_string(),
                actual_genus: parent.genus_id.to_string(),
            });
        }
        if let Some(allowed_states) = &feature_genus.parent_state_constraint {
            let parent_state = self.current_state(parent_res_id, branches);
            let status = parent_state.status.unwrap_or_default();
            if !allowed_states.contains(&status) {
                return Err(SmaragdaError::ValidationError {
                    genus_id: feature_genus_id.to_string(),
                    key: "status".to_string(),
                    reason: format!(
                        "parent must be in one of {allowed_states:?}, found '{status}'"
                    ),
                });
            }
        }

        self.validate_attributes(feature_genus_id, &attributes)?;

        let feature = Res::new(feature_genus_id, branch_id);
        self.store.create_res(feature.clone()).await?;
        for (key, value) in attributes {
            self.store
                .append_tessella(
                    feature.id,
                    branch_id,
                    TessellaType::AttributeSet { key, value },
                    "local",
                )
                .await?;
        }
        self.store
            .append_tessella(
                parent_res_id,
                branch_id,
                TessellaType::FeatureAdded {
                    feature_res_id: feature.id,
                },
                "local",
            )
            .await?;

        let state = self.current_state(feature.id, branches);
        Ok((feature.id, state))
    }

    /// Create a new relationship res linking `role_fillers`.
    pub async fn create_relationship(
        &self,
        relationship_genus_id: Id,
        branch_id: Id,
        role_fillers: Vec<(String, Vec<Id>)>,
        attributes: Vec<(String, AttributeValue)>,
        branches: Option<&HashSet<Id>>,
    ) -> SmaragdaResult<(Id, EntityState)> {
        let genus = self.registry.get(relationship_genus_id)?;
        let rel_genus = match &genus {
            Genus::Relationship(g) => g,
            _ => {
                return Err(SmaragdaError::GenusMismatch {
                    res_id: "(new)".to_string(),
                    expected_genus: "relationship".to_string(),
                    actual_genus: relationship_genus_id.to_string(),
                })
            }
        };

        for role_def in &rel_genus.roles {
            let fillers = role_fillers
                .iter()
                .find(|(name, _)| name == &role_def.name)
                .map(|(_, ids)| ids.as_slice())
                .unwrap_or(&[]);
            let count = fillers.len();
            let max_ok = role_def.max.map(|m| count <= m).unwrap_or(true);
            if count < role_def.min || !max_ok {
                return Err(SmaragdaError::CardinalityViolation {
                    genus_id: relationship_genus_id.to_string(),
                    role: role_def.name.clone(),
                    expected: match role_def.max {
                        Some(max) => format!("{}..={}", role_def.min, max),
                        None => format!(">={}", role_def.min),
                    },
                    actual: count,
                });
            }
            for filler_id in fillers {
                let filler = self.store.get_res(*filler_id)?;
                if filler.genus_id != role_def.genus_constraint {
                    return Err(SmaragdaError::GenusMismatch {
                        res_id: filler_id.to_string(),
                        expected_genus: role_def.genus_constraint.to_string(),
                        actual_genus: filler.genus_id.to_string(),
                    });
                }
            }
        }

        self.validate_attributes(relationship_genus_id, &attributes)?;

        let relationship = Res::new(relationship_genus_id, branch_id);
        self.store.create_res(relationship.clone()).await?;
        for (role, fillers) in role_fillers {
            for other_res_id in fillers {
                self.store
                    .append_tessella(
                        relationship.id,
                        branch_id,
                        TessellaType::RelationshipLinked {
                            role: role.clone(),
                            other_res_id,
                        },
                        "local",
                    )
                    .await?;
            }
        }
        for (key, value) in attributes {
            self.store
                .append_tessella(
                    relationship.id,
                    branch_id,
                    TessellaType::AttributeSet { key, value },
                    "local",
                )
                .await?;
        }

        let state = self.current_state(relationship.id, branches);
        Ok((relationship.id, state))
    }

    fn matching_res_ids(
        &self,
        genus_id: Id,
        attribute_filter: &Option<(String, AttributeValue)>,
        branches: Option<&HashSet<Id>>,
    ) -> Vec<Id> {
        self.store
            .all_res_ids()
            .into_iter()
            .filter(|id| {
                self.store
                    .get_res(*id)
                    .map(|r| r.genus_id == genus_id)
                    .unwrap_or(false)
            })
            .filter(|id| match attribute_filter {
                Some((key, expected)) => {
                    let state = self.current_state(*id, branches);
                    state.attributes.get(key) == Some(expected)
                }
                None => true,
            })
            .collect()
    }

    async fn apply_op(
        &self,
        res_id: Id,
        branch_id: Id,
        op: &BatchOp,
        branches: Option<&HashSet<Id>>,
    ) -> SmaragdaResult<EntityState> {
        match op.clone() {
            BatchOp::SetAttribute { key, value } => {
                self.set_attribute(res_id, branch_id, key, value, branches)
                    .await
            }
            BatchOp::TargetStatus(to) => {
                let res = self.store.get_res(res_id)?;
                let current = self
                    .current_state(res_id, branches)
                    .status
                    .unwrap_or_default();
                if current != to {
                    self.drive_to_status(res_id, branch_id, res.genus_id, &current, &to)
                        .await?;
                }
                Ok(self.current_state(res_id, branches))
            }
        }
    }

    /// Apply a batch of updates. Explicit targets are applied in array
    /// order; `where`-clause targets are applied in the (unspecified)
    /// order the log store enumerates matching res. When
    /// `continue_on_error` is `false` (the default), the first failing
    /// item aborts the remainder and the error is returned wrapped in
    /// [`SmaragdaError::BatchItemFailed`]; when `true`, every item is
    /// attempted and the per-item outcomes are all returned.
    pub async fn batch_update(
        &self,
        branch_id: Id,
        target: BatchTarget,
        continue_on_error: bool,
        branches: Option<&HashSet<Id>>,
    ) -> SmaragdaResult<Vec<SmaragdaResult<EntityState>>> {
        let items: Vec<(Id, BatchOp)> = match target {
            BatchTarget::Explicit(pairs) => pairs,
            BatchTarget::Where {
                genus_id,
                attribute_filter,
                op,
            } => self
                .matching_res_ids(genus_id, &attribute_filter, branches)
                .into_iter()
                .map(|id| (id, op.clone()))
                .collect(),
        };

        let mut results = Vec::with_capacity(items.len());
        for (index, (res_id, op)) in items.into_iter().enumerate() {
            let outcome = self.apply_op(res_id, branch_id, &op, branches).await;
            match outcome {
                Ok(state) => results.push(Ok(state)),
                Err(e) => {
                    if continue_on_error {
                        results.push(Err(e));
                    } else {
                        return Err(SmaragdaError::BatchItemFailed {
                            index,
                            source: Box::new(e),
                        });
                    }
                }
            }
        }
        Ok(results)
    }
}
