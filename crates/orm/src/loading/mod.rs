//! Loading-strategy engine
//!
//! Turns a [`FetchRequest`] into a [`LoadPlan`], issues the root query (with
//! any joined relations folded in), then one query per batched or subquery
//! level. Relations left lazy stay unloaded until resolved explicitly through
//! the unit of work, one counted point query at a time.

pub mod batched;
pub mod graph;
pub mod joined;
pub mod lazy;
pub mod plan;
pub mod strategy;

pub use graph::{EntityGraph, LoadedRelation, RelationSlot};
pub use plan::{LoadPlan, PlanNode};
pub use strategy::{AggregateRequest, FetchRequest, LoadStrategy, ProjectionRequest};

use async_trait::async_trait;
use uuid::Uuid;

use crate::backends::ResultRow;
use crate::error::OrmResult;
use crate::query::SelectQuery;

use batched::{load_below, LoadContext};
use joined::{assemble, build_query, LevelQuery};

/// Something that runs a SELECT and counts it: a unit of work, or an open
/// transaction
#[async_trait]
pub trait RowFetcher: Send {
    async fn fetch_rows(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>>;
}

/// Run a fetch request to completion
pub(crate) async fn fetch_graphs(
    fetcher: &mut dyn RowFetcher,
    request: &FetchRequest,
    max_batch_size: usize,
    unit_of_work: Uuid,
) -> OrmResult<Vec<EntityGraph>> {
    let plan = LoadPlan::build(request.kind, &request.paths)?;
    let level = LevelQuery {
        filter: request.filter.clone(),
        order_by: request.order_by.clone(),
        limit: request.limit,
        offset: request.offset,
    };

    let joined: Vec<&PlanNode> = plan.joined().collect();
    let rows = fetcher.fetch_rows(&build_query(request.kind, &level, &joined)).await?;
    let mut graphs = assemble(request.kind, &rows, &joined, unit_of_work)?;

    if !plan.is_empty() {
        let context = LoadContext {
            max_batch_size,
            unit_of_work,
        };
        let root_query = build_query(request.kind, &level, &[]);
        load_below(fetcher, graphs.iter_mut().collect(), &plan.nodes, Some(root_query), context).await?;
    }
    Ok(graphs)
}
