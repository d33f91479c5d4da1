//! Load plans
//!
//! Requested paths are merged into a tree of relation nodes. A path's
//! intermediate hops that were not requested themselves inherit the path's
//! strategy, so `batched("order_items.product")` loads `order_items` batched
//! as well. Asking for an eager path underneath a hop that was explicitly
//! requested lazy is contradictory and rejected.

use crate::error::{OrmError, OrmResult};
use crate::relationships::{resolve_path, RelationDef};
use crate::schema::EntityKind;

use super::strategy::LoadStrategy;

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub relation: &'static RelationDef,
    pub strategy: LoadStrategy,
    /// Dotted path from the root, e.g. `order_items.product`
    pub path: String,
    pub children: Vec<PlanNode>,
    explicit: bool,
}

impl PlanNode {
    fn new(relation: &'static RelationDef, strategy: LoadStrategy, path: String, explicit: bool) -> Self {
        Self {
            relation,
            strategy,
            path,
            children: Vec::new(),
            explicit,
        }
    }

    /// Children loaded by the same query as this node
    pub fn joined_children(&self) -> impl Iterator<Item = &PlanNode> {
        self.children.iter().filter(|c| c.strategy == LoadStrategy::Joined)
    }

    fn has_eager_descendant(&self) -> Option<&PlanNode> {
        self.children.iter().find_map(|child| {
            if child.strategy.is_eager() {
                Some(child)
            } else {
                child.has_eager_descendant()
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadPlan {
    pub root: EntityKind,
    pub nodes: Vec<PlanNode>,
}

impl LoadPlan {
    pub fn build(root: EntityKind, paths: &[(String, LoadStrategy)]) -> OrmResult<Self> {
        let mut nodes: Vec<PlanNode> = Vec::new();

        for (path, strategy) in paths {
            let hops = resolve_path(root, path)?;
            let mut level = &mut nodes;
            let mut prefix = String::new();

            for (depth, relation) in hops.iter().enumerate() {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(relation.name);
                let last = depth + 1 == hops.len();

                let index = match level.iter().position(|n| n.relation.name == relation.name) {
                    Some(index) => {
                        let node = &mut level[index];
                        if last {
                            node.strategy = *strategy;
                            node.explicit = true;
                        } else if !node.explicit && !node.strategy.is_eager() && strategy.is_eager() {
                            node.strategy = *strategy;
                        }
                        index
                    }
                    None => {
                        level.push(PlanNode::new(relation, *strategy, prefix.clone(), last));
                        level.len() - 1
                    }
                };
                level = &mut level[index].children;
            }
        }

        for node in &nodes {
            check_lazy_prefixes(root, node)?;
        }
        Ok(Self { root, nodes })
    }

    /// Nodes loaded by the root query itself
    pub fn joined(&self) -> impl Iterator<Item = &PlanNode> {
        self.nodes.iter().filter(|n| n.strategy == LoadStrategy::Joined)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|n| !n.strategy.is_eager())
    }
}

fn check_lazy_prefixes(root: EntityKind, node: &PlanNode) -> OrmResult<()> {
    if !node.strategy.is_eager() {
        if let Some(eager) = node.has_eager_descendant() {
            return Err(OrmError::invalid_path(
                root,
                format!("{} ({} below lazy '{}')", eager.path, eager.strategy, node.path),
            ));
        }
        return Ok(());
    }
    node.children.iter().try_for_each(|child| check_lazy_prefixes(root, child))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(requested: &[(&str, LoadStrategy)]) -> Vec<(String, LoadStrategy)> {
        requested.iter().map(|(p, s)| (p.to_string(), *s)).collect()
    }

    #[test]
    fn test_intermediate_hops_inherit_strategy() {
        let plan = LoadPlan::build(
            EntityKind::Order,
            &paths(&[("order_items.product.manufacturer", LoadStrategy::Batched)]),
        )
        .unwrap();

        assert_eq!(plan.nodes.len(), 1);
        let items = &plan.nodes[0];
        assert_eq!(items.strategy, LoadStrategy::Batched);
        assert_eq!(items.children[0].path, "order_items.product");
        assert_eq!(items.children[0].children[0].strategy, LoadStrategy::Batched);
    }

    #[test]
    fn test_explicit_request_overrides_inherited() {
        let plan = LoadPlan::build(
            EntityKind::Order,
            &paths(&[
                ("order_items.product", LoadStrategy::Joined),
                ("order_items", LoadStrategy::Batched),
            ]),
        )
        .unwrap();

        let items = &plan.nodes[0];
        assert_eq!(items.strategy, LoadStrategy::Batched);
        assert_eq!(items.children[0].strategy, LoadStrategy::Joined);
        assert_eq!(plan.joined().count(), 0);
    }

    #[test]
    fn test_eager_below_explicit_lazy_is_rejected() {
        let err = LoadPlan::build(
            EntityKind::Product,
            &paths(&[
                ("manufacturer", LoadStrategy::Lazy),
                ("manufacturer.products", LoadStrategy::Batched),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, OrmError::InvalidPath { .. }));
    }

    #[test]
    fn test_unknown_path_is_rejected() {
        let err = LoadPlan::build(EntityKind::Product, &paths(&[("vendor", LoadStrategy::Joined)])).unwrap_err();
        assert!(matches!(err, OrmError::InvalidPath { ref path, .. } if path == "vendor"));
    }

    #[test]
    fn test_lazy_only_plan_is_empty() {
        let plan = LoadPlan::build(EntityKind::Product, &paths(&[("category", LoadStrategy::Lazy)])).unwrap();
        assert!(plan.is_empty());
    }
}
