//! Genus registry: schema definitions and validation.
//!
//! A genus names attributes, states, transitions, roles, and templates for
//! a family of res. Genera are themselves data (not Rust types), stored in
//! a `DashMap` keyed by id and consulted on every hot mutation path without
//! a storage round-trip.
use crate::error::{SmaragdaError, SmaragdaResult};
use crate::ids::Id;
use crate::types::AttributeValue;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// The semantic type declared for an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttrType {
    /// Free text.
    Text,
    /// Floating point number.
    Number,
    /// Whole number.
    Integer,
    /// Boolean flag.
    Boolean,
    /// One of a fixed set of choices.
    Enum {
        /// The declared choices.
        choices: Vec<String>,
    },
    /// A point in time.
    Timestamp,
    /// A reference to a res of a declared genus.
    Ref {
        /// The genus the referenced res must belong to.
        genus_id: Id,
    },
}

impl AttrType {
    /// Does `value` satisfy this declared type?
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        match (self, value) {
            (AttrType::Text, AttributeValue::Text(_)) => true,
            (AttrType::Number, AttributeValue::Number(_)) => true,
            (AttrType::Integer, AttributeValue::Integer(_)) => true,
            (AttrType::Boolean, AttributeValue::Boolean(_)) => true,
            (AttrType::Timestamp, AttributeValue::Timestamp(_)) => true,
            (AttrType::Enum { choices }, AttributeValue::Enum(tag)) => choices.contains(tag),
            (AttrType::Ref { .. }, AttributeValue::Ref(_)) => true,
            _ => false,
        }
    }
}

/// A single declared attribute on a genus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute key.
    pub name: String,
    /// The declared type.
    pub attr_type: AttrType,
    /// Whether `get_health` requires this attribute to be set.
    pub required: bool,
}

impl Attribute {
    /// Construct a new attribute declaration.
    pub fn new(name: impl Into<String>, attr_type: AttrType, required: bool) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required,
        }
    }
}

/// A declared state in an entity genus's state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    /// State name (e.g. `"provisioning"`).
    pub name: String,
    /// Whether `createEntity` may start here. Exactly one state per genus
    /// is flagged initial.
    pub initial: bool,
}

/// A declared directed transition between two states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Source state.
    pub from: String,
    /// Destination state.
    pub to: String,
    /// Attribute keys that must already be set before this transition is legal.
    #[serde(default)]
    pub requires: Vec<String>,
}

/// A named role on a relationship genus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDef {
    /// Role name (e.g. `"author"`, `"publisher"`).
    pub name: String,
    /// The genus a res filling this role must belong to.
    pub genus_constraint: Id,
    /// Minimum number of res that must fill this role.
    pub min: usize,
    /// Maximum number of res that may fill this role (`None` = unbounded).
    pub max: Option<usize>,
}

/// An ordered step within a process genus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    /// Step name.
    pub name: String,
    /// Which lane this step belongs to.
    pub lane: String,
    /// Declaration order within the process.
    pub order: u32,
}

/// Fields common to every genus kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenusMeta {
    /// Globally unique id.
    pub id: Id,
    /// Display name. A hint, not a key — uniqueness is only enforced
    /// within a taxonomy for usability.
    pub name: String,
    /// Optional taxonomy grouping (e.g. `"infrastructure"`, `"historical"`).
    pub taxonomy: Option<String>,
    /// Deprecated genera are hidden from `findGenusByName` but never deleted.
    pub deprecated: bool,
}

/// An entity genus: the schema for a top-level, state-carrying res.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGenus {
    /// Common fields.
    pub meta: GenusMeta,
    /// Declared attributes.
    pub attributes: Vec<Attribute>,
    /// Declared states.
    pub states: Vec<StateDef>,
    /// Declared transitions.
    pub transitions: Vec<Transition>,
    /// Named attribute-value presets `evolveGenus` may append to.
    pub templates: Vec<String>,
}

/// A feature genus: schema for a res that attaches to a parent entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGenus {
    /// Common fields.
    pub meta: GenusMeta,
    /// The entity genus this feature attaches to.
    pub parent_entity_genus: Id,
    /// If set, the parent must be in one of these states for the feature to attach.
    pub parent_state_constraint: Option<Vec<String>>,
    /// Declared attributes.
    pub attributes: Vec<Attribute>,
}

/// A relationship genus: schema for a first-class res linking ≥2 entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGenus {
    /// Common fields.
    pub meta: GenusMeta,
    /// Declared roles (at least two).
    pub roles: Vec<RoleDef>,
    /// Declared attributes.
    pub attributes: Vec<Attribute>,
}

/// An action genus: schema for a logged, attribute-free operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGenus {
    /// Common fields.
    pub meta: GenusMeta,
    /// Declared attributes (action payload shape).
    pub attributes: Vec<Attribute>,
}

/// A process genus: schema for a multi-lane, ordered workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGenus {
    /// Common fields.
    pub meta: GenusMeta,
    /// Declared lanes.
    pub lanes: Vec<String>,
    /// Declared steps.
    pub steps: Vec<ProcessStep>,
}

/// Any one of the five genus kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Genus {
    /// Entity schema.
    Entity(EntityGenus),
    /// Feature schema.
    Feature(FeatureGenus),
    /// Relationship schema.
    Relationship(RelationshipGenus),
    /// Action schema.
    Action(ActionGenus),
    /// Process schema.
    Process(ProcessGenus),
}

impl Genus {
    /// The fields common to every genus kind.
    pub fn meta(&self) -> &GenusMeta {
        match self {
            Genus::Entity(g) => &g.meta,
            Genus::Feature(g) => &g.meta,
            Genus::Relationship(g) => &g.meta,
            Genus::Action(g) => &g.meta,
            Genus::Process(g) => &g.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut GenusMeta {
        match self {
            Genus::Entity(g) => &mut g.meta,
            Genus::Feature(g) => &mut g.meta,
            Genus::Relationship(g) => &mut g.meta,
            Genus::Action(g) => &mut g.meta,
            Genus::Process(g) => &mut g.meta,
        }
    }

    /// Declared attributes, for kinds that carry them (entity/feature/relationship/action).
    pub fn attributes(&self) -> &[Attribute] {
        match self {
            Genus::Entity(g) => &g.attributes,
            Genus::Feature(g) => &g.attributes,
            Genus::Relationship(g) => &g.attributes,
            Genus::Action(g) => &g.attributes,
            Genus::Process(_) => &[],
        }
    }

    /// As an entity genus, if this is one.
    pub fn as_entity(&self) -> Option<&EntityGenus> {
        match self {
            Genus::Entity(g) => Some(g),
            _ => None,
        }
    }
}

/// An additive mutation accepted by `evolveGenus`. Nothing here can remove
/// or rename an existing attribute/state/transition/template — evolution is
/// monotone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GenusEvolution {
    /// Add a new attribute.
    AddAttribute(Attribute),
    /// Add a new state.
    AddState(StateDef),
    /// Add a new transition.
    AddTransition(Transition),
    /// Add a new template name.
    AddTemplate(String),
}

/// The in-memory genus cache, rebuilt incrementally as genus-defining or
/// genus-evolving calls commit. Every validation path in
/// [`crate::mutation`] reads through this cache rather than the log store.
#[derive(Debug, Default)]
pub struct GenusRegistry {
    by_id: DashMap<Id, Genus>,
    name_index: DashMap<(Option<String>, String), Id>,
}

impl GenusRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve_name(&self, taxonomy: &Option<String>, name: &str) -> SmaragdaResult<()> {
        let key = (taxonomy.clone(), name.to_string());
        if self.name_index.contains_key(&key) {
            return Err(SmaragdaError::ValidationError {
                genus_id: "(new)".to_string(),
                key: "name".to_string(),
                reason: format!(
                    "genus name '{name}' already used in taxonomy {taxonomy:?}"
                ),
            });
        }
        Ok(())
    }

    fn insert(&self, genus: Genus) -> Id {
        let meta = genus.meta().clone();
        let id = meta.id;
        self.name_index
            .insert((meta.taxonomy.clone(), meta.name.clone()), id);
        self.by_id.insert(id, genus);
        id
    }

    /// Define a new entity genus. Exactly one state must be flagged initial.
    pub fn define_entity_genus(
        &self,
        name: impl Into<String>,
        taxonomy: Option<String>,
        attributes: Vec<Attribute>,
        states: Vec<StateDef>,
        transitions: Vec<Transition>,
    ) -> SmaragdaResult<Id> {
        let name = name.into();
        self.reserve_name(&taxonomy, &name)?;
        let initial_count = states.iter().filter(|s| s.initial).count();
        if initial_count != 1 {
            return Err(SmaragdaError::ValidationError {
                genus_id: "(new)".to_string(),
                key: "states".to_string(),
                reason: format!(
                    "entity genus must declare exactly one initial state, found {initial_count}"
                ),
            });
        }
        let genus = Genus::Entity(EntityGenus {
            meta: GenusMeta {
                id: Id::new(),
                name,
                taxonomy,
                deprecated: false,
            },
            attributes,
            states,
            transitions,
            templates: Vec::new(),
        });
        Ok(self.insert(genus))
    }

    /// Define a new feature genus.
    pub fn define_feature_genus(
        &self,
        name: impl Into<String>,
        taxonomy: Option<String>,
        parent_entity_genus: Id,
        parent_state_constraint: Option<Vec<String>>,
        attributes: Vec<Attribute>,
    ) -> SmaragdaResult<Id> {
        let name = name.into();
        self.reserve_name(&taxonomy, &name)?;
        let genus = Genus::Feature(FeatureGenus {
            meta: GenusMeta {
                id: Id::new(),
                name,
                taxonomy,
                deprecated: false,
            },
            parent_entity_genus,
            parent_state_constraint,
            attributes,
        });
        Ok(self.insert(genus))
    }

    /// Define a new relationship genus. Requires ≥2 roles.
    pub fn define_relationship_genus(
        &self,
        name: impl Into<String>,
        taxonomy: Option<String>,
        roles: Vec<RoleDef>,
        attributes: Vec<Attribute>,
    ) -> SmaragdaResult<Id> {
        let name = name.into();
        self.reserve_name(&taxonomy, &name)?;
        if roles.len() < 2 {
            return Err(SmaragdaError::ValidationError {
                genus_id: "(new)".to_string(),
                key: "roles".to_string(),
                reason: format!(
                    "relationship genus must declare at least 2 roles, found {}",
                    roles.len()
                ),
            });
        }
        let genus = Genus::Relationship(RelationshipGenus {
            meta: GenusMeta {
                id: Id::new(),
                name,
                taxonomy,
                deprecated: false,
            },
            roles,
            attributes,
        });
        Ok(self.insert(genus))
    }

    /// Define a new action genus.
    pub fn define_action_genus(
        &self,
        name: impl Into<String>,
        taxonomy: Option<String>,
        attributes: Vec<Attribute>,
    ) -> SmaragdaResult<Id> {
        let name = name.into();
        self.reserve_name(&taxonomy, &name)?;
        let genus = Genus::Action(ActionGenus {
            meta: GenusMeta {
                id: Id::new(),
                name,
                taxonomy,
                deprecated: false,
            },
            attributes,
        });
        Ok(self.insert(genus))
    }

    /// Define a new process genus.
    pub fn define_process_genus(
        &self,
        name: impl Into<String>,
        taxonomy: Option<String>,
        lanes: Vec<String>,
        steps: Vec<ProcessStep>,
    ) -> SmaragdaResult<Id> {
        let name = name.into();
        self.reserve_name(&taxonomy, &name)?;
        let genus = Genus::Process(ProcessGenus {
            meta: GenusMeta {
                id: Id::new(),
                name,
                taxonomy,
                deprecated: false,
            },
            lanes,
            steps,
        });
        Ok(self.insert(genus))
    }

    /// Look up a genus by id.
    pub fn get(&self, id: Id) -> SmaragdaResult<Genus> {
        self.by_id
            .get(&id)
            .map(|g| g.clone())
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "genus",
                id: id.to_string(),
            })
    }

    /// Find a genus by display name (and, optionally, taxonomy). Deprecated
    /// genera are skipped.
    pub fn find_genus_by_name(&self, name: &str, taxonomy: Option<&str>) -> Option<Id> {
        let id = *self
            .name_index
            .get(&(taxonomy.map(str::to_string), name.to_string()))?;
        let genus = self.by_id.get(&id)?;
        if genus.meta().deprecated {
            None
        } else {
            Some(id)
        }
    }

    /// Apply an additive-only evolution to an entity genus.
    pub fn evolve_genus(&self, id: Id, evolution: GenusEvolution) -> SmaragdaResult<()> {
        let mut entry = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "genus",
                id: id.to_string(),
            })?;
        match (&mut *entry, evolution) {
            (Genus::Entity(g), GenusEvolution::AddAttribute(attr)) => g.attributes.push(attr),
            (Genus::Entity(g), GenusEvolution::AddState(state)) => g.states.push(state),
            (Genus::Entity(g), GenusEvolution::AddTransition(t)) => g.transitions.push(t),
            (Genus::Entity(g), GenusEvolution::AddTemplate(name)) => g.templates.push(name),
            (other, GenusEvolution::AddAttribute(attr)) => match other {
                Genus::Feature(g) => g.attributes.push(attr),
                Genus::Relationship(g) => g.attributes.push(attr),
                Genus::Action(g) => g.attributes.push(attr),
                _ => {
                    return Err(SmaragdaError::ValidationError {
                        genus_id: id.to_string(),
                        key: "attributes".to_string(),
                        reason: "this genus kind does not carry attributes".to_string(),
                    })
                }
            },
            _ => {
                return Err(SmaragdaError::ValidationError {
                    genus_id: id.to_string(),
                    key: "evolution".to_string(),
                    reason: "states and transitions can only be added to entity genera"
                        .to_string(),
                })
            }
        }
        Ok(())
    }

    /// Mark a genus deprecated. It stays fully usable for replay of past
    /// tessellae, just hidden from `findGenusByName`.
    pub fn deprecate_genus(&self, id: Id) -> SmaragdaResult<()> {
        let mut entry = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "genus",
                id: id.to_string(),
            })?;
        entry.meta_mut().deprecated = true;
        Ok(())
    }

    /// Clear a genus's deprecated flag.
    pub fn restore_genus(&self, id: Id) -> SmaragdaResult<()> {
        let mut entry = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "genus",
                id: id.to_string(),
            })?;
        entry.meta_mut().deprecated = false;
        Ok(())
    }

    /// Rename a genus's taxonomy label. Never touches res that reference
    /// the genus — references are by id.
    pub fn move_genus(&self, id: Id, new_taxonomy: Option<String>) -> SmaragdaResult<()> {
        let mut entry = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SmaragdaError::NotFound {
                kind: "genus",
                id: id.to_string(),
            })?;
        let meta = entry.meta_mut();
        self.name_index
            .remove(&(meta.taxonomy.clone(), meta.name.clone()));
        meta.taxonomy = new_taxonomy.clone();
        let key = (new_taxonomy, meta.name.clone());
        self.name_index.insert(key, id);
        Ok(())
    }

    /// Validate that `value` satisfies the declared type of attribute `key`
    /// on `genus_id`.
    pub fn validate_attribute(
        &self,
        genus_id: Id,
        key: &str,
        value: &AttributeValue,
    ) -> SmaragdaResult<()> {
        let genus = self.get(genus_id)?;
        let attr = genus
            .attributes()
            .iter()
            .find(|a| a.name == key)
            .ok_or_else(|| SmaragdaError::ValidationError {
                genus_id: genus_id.to_string(),
                key: key.to_string(),
                reason: "attribute not declared on genus".to_string(),
            })?;
        if !attr.attr_type.accepts(value) {
            return Err(SmaragdaError::ValidationError {
                genus_id: genus_id.to_string(),
                key: key.to_string(),
                reason: format!(
                    "value of type '{}' does not satisfy declared type",
                    value.type_name()
                ),
            });
        }
        Ok(())
    }

    /// The declared type of attribute `key` on `genus_id`, if the attribute
    /// is declared. Used by the mutation boundary to resolve `Ref` targets,
    /// which requires the res table and so cannot happen here.
    pub fn attribute_type(&self, genus_id: Id, key: &str) -> SmaragdaResult<Option<AttrType>> {
        let genus = self.get(genus_id)?;
        Ok(genus
            .attributes()
            .iter()
            .find(|a| a.name == key)
            .map(|a| a.attr_type.clone()))
    }

    /// The keys of every required attribute on `genus_id`.
    pub fn required_attributes(&self, genus_id: Id) -> SmaragdaResult<Vec<String>> {
        let genus = self.get(genus_id)?;
        Ok(genus
            .attributes()
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.clone())
            .collect())
    }

    /// The genus's sole initial state.
    pub fn initial_state(&self, genus_id: Id) -> SmaragdaResult<String> {
        let genus = self.get(genus_id)?;
        let entity = genus
            .as_entity()
            .ok_or_else(|| SmaragdaError::ValidationError {
                genus_id: genus_id.to_string(),
                key: "status".to_string(),
                reason: "only entity genera have a state machine".to_string(),
            })?;
        entity
            .states
            .iter()
            .find(|s| s.initial)
            .map(|s| s.name.clone())
            .ok_or_else(|| SmaragdaError::ValidationError {
                genus_id: genus_id.to_string(),
                key: "states".to_string(),
                reason: "no initial state declared".to_string(),
            })
    }

    /// Is `(from, to)` a declared transition edge?
    pub fn is_transition_declared(&self, genus_id: Id, from: &str, to: &str) -> SmaragdaResult<bool> {
        Ok(self.get_transition(genus_id, from, to)?.is_some())
    }

    /// The declared transition edge `(from, to)`, if one exists, including
    /// its `requires` preconditions.
    pub fn get_transition(
        &self,
        genus_id: Id,
        from: &str,
        to: &str,
    ) -> SmaragdaResult<Option<Transition>> {
        let genus = self.get(genus_id)?;
        let entity = genus
            .as_entity()
            .ok_or_else(|| SmaragdaError::ValidationError {
                genus_id: genus_id.to_string(),
                key: "status".to_string(),
                reason: "only entity genera have a state machine".to_string(),
            })?;
        Ok(entity
            .transitions
            .iter()
            .find(|t| t.from == from && t.to == to)
            .cloned())
    }

    /// Compute the shortest transition path from `from` to `to`
    /// (breadth-first, ties broken by declaration order). Returns the
    /// sequence of states visited *after* `from`, i.e. `path.last() == to`.
    pub fn shortest_transition_path(
        &self,
        genus_id: Id,
        from: &str,
        to: &str,
    ) -> SmaragdaResult<Vec<String>> {
        if from == to {
            return Ok(Vec::new());
        }
        let genus = self.get(genus_id)?;
        let entity = genus
            .as_entity()
            .ok_or_else(|| SmaragdaError::ValidationError {
                genus_id: genus_id.to_string(),
                key: "status".to_string(),
                reason: "only entity genera have a state machine".to_string(),
            })?;

        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for t in &entity.transitions {
            adjacency
                .entry(t.from.as_str())
                .or_default()
                .push(t.to.as_str());
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(from);
        let mut queue: VecDeque<Vec<&str>> = VecDeque::new();
        queue.push_back(vec![from]);

        while let Some(path) = queue.pop_front() {
            let current = *path.last().unwrap();
            if let Some(neighbors) = adjacency.get(current) {
                for next in neighbors {
                    if *next == to {
                        let mut full = path.clone();
                        full.push(next);
                        return Ok(full[1..].iter().map(|s| s.to_string()).collect());
                    }
                    if visited.insert(next) {
                        let mut extended = path.clone();
                        extended.push(next);
                        queue.push_back(extended);
                    }
                }
            }
        }

        Err(SmaragdaError::UnreachableStatus {
            genus_id: genus_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_genus(registry: &GenusRegistry) -> Id {
        registry
            .define_entity_genus(
                "Server",
                None,
                vec![Attribute::new("hostname", AttrType::Text, true)],
                vec![
                    StateDef {
                        name: "provisioning".into(),
                        initial: true,
                    },
                    StateDef {
                        name: "active".into(),
                        initial: false,
                    },
                    StateDef {
                        name: "decommissioned".into(),
                        initial: false,
                    },
                ],
                vec![
                    Transition {
                        from: "provisioning".into(),
                        to: "active".into(),
                        requires: vec![],
                    },
                    Transition {
                        from: "active".into(),
                        to: "decommissioned".into(),
                        requires: vec![],
                    },
                ],
            )
            .unwrap()
    }

    #[test]
    fn entity_genus_requires_exactly_one_initial_state() {
        let registry = GenusRegistry::new();
        let err = registry
            .define_entity_genus(
                "Bad",
                None,
                vec![],
                vec![
                    StateDef {
                        name: "a".into(),
                        initial: true,
                    },
                    StateDef {
                        name: "b".into(),
                        initial: true,
                    },
                ],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, SmaragdaError::ValidationError { .. }));
    }

    #[test]
    fn relationship_genus_requires_at_least_two_roles() {
        let registry = GenusRegistry::new();
        let err = registry
            .define_relationship_genus(
                "Authored",
                None,
                vec![RoleDef {
                    name: "author".into(),
                    genus_constraint: Id::new(),
                    min: 1,
                    max: Some(1),
                }],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, SmaragdaError::ValidationError { .. }));
    }

    #[test]
    fn shortest_transition_path_finds_direct_edge() {
        let registry = GenusRegistry::new();
        let genus = server_genus(&registry);
        let path = registry
            .shortest_transition_path(genus, "provisioning", "active")
            .unwrap();
        assert_eq!(path, vec!["active".to_string()]);
    }

    #[test]
    fn shortest_transition_path_traverses_multiple_hops() {
        let registry = GenusRegistry::new();
        let genus = server_genus(&registry);
        let path = registry
            .shortest_transition_path(genus, "provisioning", "decommissioned")
            .unwrap();
        assert_eq!(path, vec!["active".to_string(), "decommissioned".to_string()]);
    }

    #[test]
    fn shortest_transition_path_fails_when_unreachable() {
        let registry = GenusRegistry::new();
        let genus = server_genus(&registry);
        let err = registry
            .shortest_transition_path(genus, "decommissioned", "provisioning")
            .unwrap_err();
        assert!(matches!(err, SmaragdaError::UnreachableStatus { .. }));
    }

    #[test]
    fn evolve_genus_is_additive_only() {
        let registry = GenusRegistry::new();
        let genus = server_genus(&registry);
        registry
            .evolve_genus(
                genus,
                GenusEvolution::AddState(StateDef {
                    name: "maintenance".into(),
                    initial: false,
                }),
            )
            .unwrap();
        let g = registry.get(genus).unwrap();
        assert_eq!(g.as_entity().unwrap().states.len(), 4);
    }

    #[test]
    fn find_genus_by_name_respects_taxonomy_scoping() {
        let registry = GenusRegistry::new();
        registry
            .define_entity_genus(
                "Server",
                Some("infra".to_string()),
                vec![],
                vec![StateDef {
                    name: "active".into(),
                    initial: true,
                }],
                vec![],
            )
            .unwrap();
        assert!(registry.find_genus_by_name("Server", Some("infra")).is_some());
        assert!(registry.find_genus_by_name("Server", None).is_none());
    }

    #[test]
    fn deprecated_genus_is_hidden_from_lookup_but_not_deleted() {
        let registry = GenusRegistry::new();
        let genus = server_genus(&registry);
        registry.deprecate_genus(genus).unwrap();
        assert!(registry.find_genus_by_name("Server", None).is_none());
        assert!(registry.get(genus).is_ok());
    }
}
