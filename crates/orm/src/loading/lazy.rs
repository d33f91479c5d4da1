//! Explicit lazy resolution
//!
//! Resolving an unloaded relation issues exactly one point query keyed by the
//! slot's key, except for a NULL foreign key, which resolves to nothing
//! without touching the store.

use tracing::debug;
use uuid::Uuid;

use crate::error::{OrmError, OrmResult};
use crate::query::SelectQuery;
use crate::relationships::{find_relation, RelationshipType};

use super::graph::{EntityGraph, LoadedRelation, RelationSlot};
use super::RowFetcher;

/// Load `name` on `graph` if it is still unloaded
pub(crate) async fn resolve(
    fetcher: &mut dyn RowFetcher,
    graph: &mut EntityGraph,
    name: &str,
    unit_of_work: Uuid,
) -> OrmResult<()> {
    let relation = find_relation(graph.kind(), name)?;
    if graph.unit_of_work() != unit_of_work {
        return Err(OrmError::Stale {
            entity: graph.kind().to_string(),
        });
    }
    if let Some(RelationSlot::Loaded(_)) = graph.relation(name) {
        return Ok(());
    }

    let key = match graph.unloaded_key(name)? {
        Some(key) => key,
        None => {
            debug!(entity = %graph.kind(), relation = name, "null key, nothing to resolve");
            graph.ensure_loaded(relation.name, relation.relationship_type);
            return Ok(());
        }
    };

    let target = relation.target;
    let mut query = SelectQuery::table(target.table()).where_eq(relation.remote_column, key);
    if relation.is_collection() {
        query = query.order_by(target.primary_key());
    }
    let rows = fetcher.fetch_rows(&query).await?;

    let related = rows
        .into_iter()
        .map(|row| EntityGraph::from_row(target, row, unit_of_work))
        .collect::<OrmResult<Vec<_>>>()?;

    let loaded = match relation.relationship_type {
        RelationshipType::BelongsTo => LoadedRelation::One(related.into_iter().next().map(Box::new)),
        RelationshipType::HasMany => LoadedRelation::Many(related),
    };
    graph.attach(relation.name, loaded);
    Ok(())
}
