//! Category hierarchy arena
//!
//! Categories are stored flat, keyed by id, each holding only its nullable
//! parent id. The children index is derived from those parent ids and kept in
//! step by [`CategoryTree::set_parent`]; no node ever stores a pointer to its
//! children.

use std::collections::{BTreeMap, BTreeSet};

use crate::backends::ResultRow;
use crate::error::{OrmError, OrmResult};

use super::records::Category;

/// Constraint reported when a parent assignment would close a loop
pub const NO_CYCLE_CONSTRAINT: &str = "category_no_cycle";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CategoryNode {
    name: String,
    parent_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTree {
    nodes: BTreeMap<i64, CategoryNode>,
    children: BTreeMap<i64, BTreeSet<i64>>,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows carrying `category_id`, `name` and `parent_category_id`
    pub fn from_rows(rows: &[ResultRow]) -> OrmResult<Self> {
        let mut tree = Self::new();
        for row in rows {
            tree.insert(
                row.get("category_id")?,
                row.get::<String>("name")?,
                row.try_get("parent_category_id")?,
            );
        }
        Ok(tree)
    }

    pub fn from_categories(categories: &[Category]) -> Self {
        let mut tree = Self::new();
        for category in categories {
            tree.insert(category.id, category.name.clone(), category.parent_category_id);
        }
        tree
    }

    /// Add or replace a node
    pub fn insert(&mut self, id: i64, name: impl Into<String>, parent_id: Option<i64>) {
        if let Some(previous) = self.nodes.get(&id).and_then(|n| n.parent_id) {
            self.unlink(id, previous);
        }
        if let Some(parent) = parent_id {
            self.children.entry(parent).or_default().insert(id);
        }
        self.nodes.insert(
            id,
            CategoryNode {
                name: name.into(),
                parent_id,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn name(&self, id: i64) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: i64) -> Option<i64> {
        self.nodes.get(&id).and_then(|n| n.parent_id)
    }

    /// Child ids in ascending order
    pub fn children(&self, id: i64) -> Vec<i64> {
        self.children
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn roots(&self) -> Vec<i64> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent_id.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Parent chain from the immediate parent up to the root.
    ///
    /// A chain that revisits a node is reported as a `category_no_cycle`
    /// violation rather than looping.
    pub fn ancestors(&self, id: i64) -> OrmResult<Vec<i64>> {
        if !self.contains(id) {
            return Err(OrmError::not_found("categories", id));
        }

        let mut chain = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                return Err(OrmError::constraint(
                    NO_CYCLE_CONSTRAINT,
                    format!("category {} is its own ancestor", parent),
                ));
            }
            chain.push(parent);
            current = self.parent(parent);
        }
        Ok(chain)
    }

    /// Number of ancestors; roots have depth 0
    pub fn depth(&self, id: i64) -> OrmResult<usize> {
        self.ancestors(id).map(|chain| chain.len())
    }

    /// Every node below `id`, breadth first
    pub fn descendants(&self, id: i64) -> Vec<i64> {
        let mut found = Vec::new();
        let mut frontier = self.children(id);
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for child in frontier {
                if found.contains(&child) {
                    continue;
                }
                found.push(child);
                next.extend(self.children(child));
            }
            frontier = next;
        }
        found
    }

    /// Whether making `new_parent` the parent of `id` would close a loop
    pub fn would_create_cycle(&self, id: i64, new_parent: Option<i64>) -> bool {
        match new_parent {
            None => false,
            Some(parent) if parent == id => true,
            Some(parent) => self.descendants(id).contains(&parent),
        }
    }

    /// Move `id` under `new_parent` (or to the root), keeping the children
    /// index in step
    pub fn set_parent(&mut self, id: i64, new_parent: Option<i64>) -> OrmResult<()> {
        if !self.contains(id) {
            return Err(OrmError::not_found("categories", id));
        }
        if let Some(parent) = new_parent {
            if !self.contains(parent) {
                return Err(OrmError::not_found("categories", parent));
            }
        }
        if self.would_create_cycle(id, new_parent) {
            return Err(OrmError::constraint(
                NO_CYCLE_CONSTRAINT,
                format!("moving category {} under {:?} would create a cycle", id, new_parent),
            ));
        }

        if let Some(previous) = self.parent(id) {
            self.unlink(id, previous);
        }
        if let Some(parent) = new_parent {
            self.children.entry(parent).or_default().insert(id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent_id = new_parent;
        }
        Ok(())
    }

    fn unlink(&mut self, id: i64, parent: i64) {
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.remove(&id);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}
