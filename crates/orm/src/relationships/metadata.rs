//! Relationship Metadata - static descriptions of every named relation

use serde::Serialize;

use crate::schema::EntityKind;

/// Defines the type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RelationshipType {
    /// Many-to-one: the owner holds the foreign key
    BelongsTo,
    /// One-to-many: the target holds the foreign key
    HasMany,
}

impl RelationshipType {
    /// Returns true if this relationship returns a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany)
    }
}

/// A named relation from `owner` to `target`.
///
/// Related rows satisfy `target.remote_column = owner.local_column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationDef {
    pub name: &'static str,
    pub owner: EntityKind,
    pub target: EntityKind,
    pub relationship_type: RelationshipType,
    /// Column on the owner's table
    pub local_column: &'static str,
    /// Column on the target's table
    pub remote_column: &'static str,
}

impl RelationDef {
    pub const fn belongs_to(
        name: &'static str,
        owner: EntityKind,
        target: EntityKind,
        foreign_key: &'static str,
        target_key: &'static str,
    ) -> Self {
        Self {
            name,
            owner,
            target,
            relationship_type: RelationshipType::BelongsTo,
            local_column: foreign_key,
            remote_column: target_key,
        }
    }

    pub const fn has_many(
        name: &'static str,
        owner: EntityKind,
        target: EntityKind,
        owner_key: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            owner,
            target,
            relationship_type: RelationshipType::HasMany,
            local_column: owner_key,
            remote_column: foreign_key,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.relationship_type.is_collection()
    }
}
