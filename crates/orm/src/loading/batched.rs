//! Batched and subquery eager loading
//!
//! Each batched level costs one extra query no matter how many parents it
//! serves: the parents' distinct keys go into a single `IN (...)` list (split
//! only when the list exceeds the configured batch size). The subquery
//! strategy re-runs the parent level's query inside the filter instead of
//! shipping keys. Related rows are grouped by their key and attached to every
//! parent that references them.

use std::collections::{BTreeSet, HashMap};

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;
use uuid::Uuid;

use crate::error::OrmResult;
use crate::query::{col, Condition, Expr, SelectItem, SelectQuery};
use crate::relationships::RelationshipType;

use super::graph::{EntityGraph, LoadedRelation};
use super::joined::{assemble, build_query, LevelQuery};
use super::plan::PlanNode;
use super::strategy::LoadStrategy;
use super::RowFetcher;

/// Settings shared by every level of one fetch
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadContext {
    pub max_batch_size: usize,
    pub unit_of_work: Uuid,
}

/// Load every eager relation in `nodes` onto `graphs`.
///
/// `level_query` is the plain query that produced `graphs`, when there is a
/// single one; subquery loads below it embed it, and fall back to a key list
/// without it.
pub(crate) fn load_below<'a>(
    fetcher: &'a mut dyn RowFetcher,
    mut graphs: Vec<&'a mut EntityGraph>,
    nodes: &'a [PlanNode],
    level_query: Option<SelectQuery>,
    context: LoadContext,
) -> BoxFuture<'a, OrmResult<()>> {
    async move {
        for node in nodes {
            match node.strategy {
                LoadStrategy::Lazy => {}
                LoadStrategy::Joined => {
                    let nested: Vec<&mut EntityGraph> = graphs
                        .iter_mut()
                        .flat_map(|graph| graph.related_mut(node.relation.name))
                        .collect();
                    load_below(&mut *fetcher, nested, &node.children, None, context).await?;
                }
                LoadStrategy::Batched | LoadStrategy::Subquery => {
                    let parents: Vec<&mut EntityGraph> = graphs.iter_mut().map(|graph| &mut **graph).collect();
                    load_level(&mut *fetcher, parents, node, level_query.clone(), context).await?;
                }
            }
        }
        Ok(())
    }
    .boxed()
}

async fn load_level(
    fetcher: &mut dyn RowFetcher,
    mut parents: Vec<&mut EntityGraph>,
    node: &PlanNode,
    parent_query: Option<SelectQuery>,
    context: LoadContext,
) -> OrmResult<()> {
    let relation = node.relation;
    let target = relation.target;

    let keys: BTreeSet<i64> = parents
        .iter()
        .map(|parent| parent.try_get::<i64>(relation.local_column))
        .collect::<OrmResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    for parent in parents.iter_mut() {
        parent.ensure_loaded(relation.name, relation.relationship_type);
    }
    if keys.is_empty() {
        debug!(path = %node.path, "no keys to load, skipping query");
        return Ok(());
    }

    let filters: Vec<Condition> = match (node.strategy, parent_query) {
        (LoadStrategy::Subquery, Some(parent_query)) => {
            vec![col(relation.remote_column).in_subquery(key_subquery(parent_query, relation.local_column))]
        }
        _ => {
            let keys: Vec<i64> = keys.into_iter().collect();
            keys.chunks(context.max_batch_size.max(1))
                .map(|chunk| col(relation.remote_column).is_in(chunk.iter().copied()))
                .collect()
        }
    };

    let joined: Vec<&PlanNode> = node.joined_children().collect();
    let single = filters.len() == 1;
    let mut own_query = None;
    let mut children: Vec<EntityGraph> = Vec::new();

    for filter in filters {
        let level = LevelQuery {
            filter: Some(filter),
            ..LevelQuery::default()
        };
        let rows = fetcher.fetch_rows(&build_query(target, &level, &joined)).await?;
        children.extend(assemble(target, &rows, &joined, context.unit_of_work)?);
        if single {
            own_query = Some(build_query(target, &level, &[]));
        }
    }
    children.sort_by_key(EntityGraph::id);

    debug!(path = %node.path, strategy = %node.strategy, rows = children.len(), "loaded relation level");

    // Grandchildren go onto the flat list first so the clones handed to each
    // parent below carry them
    load_below(
        &mut *fetcher,
        children.iter_mut().collect(),
        &node.children,
        own_query,
        context,
    )
    .await?;

    let mut grouped: HashMap<i64, Vec<EntityGraph>> = HashMap::new();
    for child in children {
        if let Some(key) = child.try_get::<i64>(relation.remote_column)? {
            grouped.entry(key).or_default().push(child);
        }
    }

    for parent in parents {
        let related = match parent.try_get::<i64>(relation.local_column)? {
            Some(key) => grouped.get(&key).cloned().unwrap_or_default(),
            None => Vec::new(),
        };
        let loaded = match relation.relationship_type {
            RelationshipType::BelongsTo => LoadedRelation::One(related.into_iter().next().map(Box::new)),
            RelationshipType::HasMany => LoadedRelation::Many(related),
        };
        parent.attach(relation.name, loaded);
    }
    Ok(())
}

/// `SELECT column FROM (parent level)`, keeping LIMIT and its ordering
fn key_subquery(mut parent_query: SelectQuery, column: &str) -> SelectQuery {
    parent_query.items = vec![SelectItem {
        expr: Expr::Column(crate::query::ColumnRef::new(column)),
        alias: None,
    }];
    if parent_query.limit.is_none() && parent_query.offset.is_none() {
        parent_query.order_by.clear();
    }
    parent_query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SqlDialect;

    #[test]
    fn test_key_subquery_drops_ordering_without_limit() {
        let parent = SelectQuery::table("orders").where_eq("status", "pending").order_by("order_id");
        let (sql, _) = key_subquery(parent, "order_id").to_sql(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT order_id FROM orders WHERE status = $1");

        let paged = SelectQuery::table("orders").order_by("order_id").limit(3);
        let (sql, _) = key_subquery(paged, "order_id").to_sql(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT order_id FROM orders ORDER BY order_id ASC LIMIT 3");
    }
}
