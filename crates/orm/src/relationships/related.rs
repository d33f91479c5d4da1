//! Relationship fields on typed records
//!
//! A relation on a record is either unloaded (carrying only the key needed to
//! fetch it) or loaded. Reading an unloaded relation never triggers I/O; the
//! caller resolves it explicitly through its unit of work.

use serde::Serialize;

use crate::error::{OrmError, OrmResult};
use crate::loading::{EntityGraph, LoadedRelation, RelationSlot};
use crate::schema::Entity;

/// To-one relation field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Related<T> {
    /// Not fetched; holds the foreign key value (None when the key is NULL)
    Unloaded(Option<i64>),
    /// Fetched; `None` when no row is related
    Loaded(Option<Box<T>>),
}

impl<T> Related<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Related::Loaded(_))
    }

    /// The related record, if loaded and present
    pub fn get(&self) -> Option<&T> {
        match self {
            Related::Loaded(Some(value)) => Some(value),
            _ => None,
        }
    }

    /// Foreign key of an unloaded relation
    pub fn key(&self) -> Option<i64> {
        match self {
            Related::Unloaded(key) => *key,
            Related::Loaded(_) => None,
        }
    }
}

impl<T: Entity> Related<T> {
    pub(crate) fn from_graph(graph: &EntityGraph, relation: &str) -> OrmResult<Self> {
        match graph.relation(relation) {
            Some(RelationSlot::Unloaded { key }) => Ok(Related::Unloaded(*key)),
            Some(RelationSlot::Loaded(LoadedRelation::One(related))) => {
                let record = related.as_deref().map(T::from_graph).transpose()?;
                Ok(Related::Loaded(record.map(Box::new)))
            }
            _ => Err(OrmError::invalid_path(graph.kind(), relation)),
        }
    }
}

/// To-many relation field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RelatedMany<T> {
    Unloaded,
    Loaded(Vec<T>),
}

impl<T> RelatedMany<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, RelatedMany::Loaded(_))
    }

    /// The related records, if loaded
    pub fn get(&self) -> Option<&[T]> {
        match self {
            RelatedMany::Loaded(values) => Some(values),
            RelatedMany::Unloaded => None,
        }
    }
}

impl<T: Entity> RelatedMany<T> {
    pub(crate) fn from_graph(graph: &EntityGraph, relation: &str) -> OrmResult<Self> {
        match graph.relation(relation) {
            Some(RelationSlot::Unloaded { .. }) => Ok(RelatedMany::Unloaded),
            Some(RelationSlot::Loaded(LoadedRelation::Many(related))) => {
                let records = related.iter().map(T::from_graph).collect::<OrmResult<Vec<_>>>()?;
                Ok(RelatedMany::Loaded(records))
            }
            _ => Err(OrmError::invalid_path(graph.kind(), relation)),
        }
    }
}
