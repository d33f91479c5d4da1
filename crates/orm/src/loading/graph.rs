//! Entity graphs
//!
//! An [`EntityGraph`] is one loaded row plus a slot per declared relation.
//! A slot is either `Unloaded` (carrying the key needed to resolve it later)
//! or `Loaded`. Nothing is fetched on access: reading an unloaded relation is
//! an error, and resolving one is an explicit, counted call on the unit of
//! work that produced the graph.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::backends::{FromDatabaseValue, ResultRow};
use crate::error::{OrmError, OrmResult};
use crate::relationships::{find_relation, relations_of, RelationshipType};
use crate::schema::{Entity, EntityKind};

/// State of one relation on a loaded entity
#[derive(Debug, Clone, PartialEq)]
pub enum RelationSlot {
    /// Not fetched. For a to-one relation `key` is the foreign key value
    /// (`None` when the column is NULL); for a to-many relation it is the
    /// owner's key.
    Unloaded { key: Option<i64> },
    Loaded(LoadedRelation),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedRelation {
    One(Option<Box<EntityGraph>>),
    Many(Vec<EntityGraph>),
}

/// A loaded entity row and its relation slots
#[derive(Debug, Clone, PartialEq)]
pub struct EntityGraph {
    kind: EntityKind,
    row: ResultRow,
    relations: BTreeMap<&'static str, RelationSlot>,
    unit_of_work: Uuid,
}

impl EntityGraph {
    /// Wrap a row of `kind`, with every relation unloaded
    pub(crate) fn from_row(kind: EntityKind, row: ResultRow, unit_of_work: Uuid) -> OrmResult<Self> {
        let mut relations = BTreeMap::new();
        for relation in relations_of(kind) {
            let key = row.try_get::<i64>(relation.local_column)?;
            relations.insert(relation.name, RelationSlot::Unloaded { key });
        }

        // Rows without a primary key cannot be stitched or resolved later
        row.get::<i64>(kind.primary_key())?;

        Ok(Self {
            kind,
            row,
            relations,
            unit_of_work,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> i64 {
        self.row
            .value(self.kind.primary_key())
            .and_then(|value| value.as_i64())
            .unwrap_or_default()
    }

    /// Identity of the unit of work that loaded this graph
    pub fn unit_of_work(&self) -> Uuid {
        self.unit_of_work
    }

    pub fn row(&self) -> &ResultRow {
        &self.row
    }

    pub fn get<T: FromDatabaseValue>(&self, column: &str) -> OrmResult<T> {
        self.row.get(column)
    }

    pub fn try_get<T: FromDatabaseValue>(&self, column: &str) -> OrmResult<Option<T>> {
        self.row.try_get(column)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSlot> {
        self.relations.get(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        matches!(self.relations.get(name), Some(RelationSlot::Loaded(_)))
    }

    /// A loaded to-one relation
    pub fn one(&self, name: &str) -> OrmResult<Option<&EntityGraph>> {
        match self.slot(name)? {
            RelationSlot::Loaded(LoadedRelation::One(related)) => Ok(related.as_deref()),
            RelationSlot::Loaded(LoadedRelation::Many(_)) => Err(OrmError::invalid_path(self.kind, name)),
            RelationSlot::Unloaded { .. } => Err(self.not_loaded(name)),
        }
    }

    /// A loaded to-many relation
    pub fn many(&self, name: &str) -> OrmResult<&[EntityGraph]> {
        match self.slot(name)? {
            RelationSlot::Loaded(LoadedRelation::Many(related)) => Ok(related),
            RelationSlot::Loaded(LoadedRelation::One(_)) => Err(OrmError::invalid_path(self.kind, name)),
            RelationSlot::Unloaded { .. } => Err(self.not_loaded(name)),
        }
    }

    /// Decode into a typed record
    pub fn into_record<T: Entity>(&self) -> OrmResult<T> {
        if T::KIND != self.kind {
            return Err(OrmError::decode(
                self.kind.primary_key(),
                format!("cannot decode a {} graph as {}", self.kind, T::KIND),
            ));
        }
        T::from_graph(self)
    }

    /// Columns plus every loaded relation, nested
    pub fn to_json(&self) -> JsonValue {
        let mut object = match self.row.to_json() {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        for (name, slot) in &self.relations {
            if let RelationSlot::Loaded(loaded) = slot {
                let value = match loaded {
                    LoadedRelation::One(related) => related.as_ref().map_or(JsonValue::Null, |g| g.to_json()),
                    LoadedRelation::Many(related) => JsonValue::Array(related.iter().map(EntityGraph::to_json).collect()),
                };
                object.insert((*name).to_string(), value);
            }
        }
        JsonValue::Object(object)
    }

    pub(crate) fn unloaded_key(&self, name: &str) -> OrmResult<Option<i64>> {
        match self.slot(name)? {
            RelationSlot::Unloaded { key } => Ok(*key),
            RelationSlot::Loaded(_) => Ok(None),
        }
    }

    pub(crate) fn attach(&mut self, name: &'static str, loaded: LoadedRelation) {
        self.relations.insert(name, RelationSlot::Loaded(loaded));
    }

    /// Mark a relation as loaded with no rows, keeping any rows already there
    pub(crate) fn ensure_loaded(&mut self, name: &'static str, relationship_type: RelationshipType) {
        let slot = self
            .relations
            .entry(name)
            .or_insert(RelationSlot::Unloaded { key: None });
        if let RelationSlot::Unloaded { .. } = slot {
            *slot = RelationSlot::Loaded(match relationship_type {
                RelationshipType::BelongsTo => LoadedRelation::One(None),
                RelationshipType::HasMany => LoadedRelation::Many(Vec::new()),
            });
        }
    }

    /// Find the related graph with `id` under `name`, building and attaching
    /// it first if it is not there yet
    pub(crate) fn merge_related<F>(
        &mut self,
        name: &'static str,
        relationship_type: RelationshipType,
        id: i64,
        build: F,
    ) -> OrmResult<&mut EntityGraph>
    where
        F: FnOnce() -> OrmResult<EntityGraph>,
    {
        self.ensure_loaded(name, relationship_type);
        let kind = self.kind;
        match self.relations.get_mut(name) {
            Some(RelationSlot::Loaded(LoadedRelation::One(slot))) => {
                if slot.is_none() {
                    *slot = Some(Box::new(build()?));
                }
                slot.as_deref_mut().ok_or_else(|| OrmError::invalid_path(kind, name))
            }
            Some(RelationSlot::Loaded(LoadedRelation::Many(items))) => {
                if let Some(position) = items.iter().position(|g| g.id() == id) {
                    return Ok(&mut items[position]);
                }
                let position = items.len();
                items.push(build()?);
                Ok(&mut items[position])
            }
            _ => Err(OrmError::invalid_path(kind, name)),
        }
    }

    /// Every graph currently loaded under `name`
    pub(crate) fn related_mut(&mut self, name: &str) -> Vec<&mut EntityGraph> {
        match self.relations.get_mut(name) {
            Some(RelationSlot::Loaded(LoadedRelation::One(Some(related)))) => vec![related.as_mut()],
            Some(RelationSlot::Loaded(LoadedRelation::Many(related))) => related.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    fn slot(&self, name: &str) -> OrmResult<&RelationSlot> {
        // Validate against the registry so a typo reads as InvalidPath, not NotLoaded
        find_relation(self.kind, name)?;
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::invalid_path(self.kind, name))
    }

    fn not_loaded(&self, name: &str) -> OrmError {
        OrmError::NotLoaded {
            entity: self.kind.to_string(),
            relation: name.to_string(),
        }
    }
}
