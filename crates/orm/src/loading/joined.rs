//! Joined eager loading
//!
//! A level and every joined relation below it are fetched by one query: the
//! level's table LEFT JOINed with each relation's table under an alias built
//! from the relation path. Root columns keep their own names; a relation's
//! columns are labelled `{alias}__{column}`. Because a to-many join repeats
//! the parent row once per child, rows are folded back together by primary
//! key, keeping the order in which parents were first seen.

use std::collections::HashMap;

use uuid::Uuid;

use crate::backends::{DatabaseValue, ResultRow};
use crate::error::OrmResult;
use crate::query::{col, Condition, Expr, JoinType, OrderBy, OrderDirection, SelectQuery};
use crate::schema::EntityKind;

use super::graph::EntityGraph;
use super::plan::PlanNode;

/// Alias a relation's table is joined under
pub(crate) fn alias_of(node: &PlanNode) -> String {
    node.path.replace('.', "__")
}

fn label(alias: &str, column: &str) -> String {
    format!("{}__{}", alias, column)
}

/// Shape of one level query, before the joins are added
#[derive(Debug, Clone, Default)]
pub(crate) struct LevelQuery {
    pub filter: Option<Condition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Build the query for `kind` with every node in `joined` (and their joined
/// descendants) folded in
pub(crate) fn build_query(kind: EntityKind, level: &LevelQuery, joined: &[&PlanNode]) -> SelectQuery {
    let root = kind.table();
    let multiplies = joined.iter().any(|node| fans_out(node));
    let paged = level.limit.is_some() || level.offset.is_some();

    let mut root_order: Vec<OrderBy> = level.order_by.clone();
    if !root_order.iter().any(|o| is_column(&o.expr, kind.primary_key())) {
        root_order.push(OrderBy::asc(kind.primary_key()));
    }

    if joined.is_empty() {
        let mut query = SelectQuery::table(root);
        query.filter = level.filter.clone();
        query.order_by = root_order;
        query.limit = level.limit;
        query.offset = level.offset;
        return query;
    }

    let mut query = if multiplies && paged {
        // LIMIT must count parents, not joined rows
        let mut inner = SelectQuery::table(root);
        inner.filter = level.filter.clone();
        inner.order_by = root_order.clone();
        inner.limit = level.limit;
        inner.offset = level.offset;
        SelectQuery::from_subquery(inner, root)
    } else {
        let mut query = SelectQuery::table(root);
        query.filter = level.filter.clone().map(|f| f.qualify(root));
        query.limit = level.limit;
        query.offset = level.offset;
        query
    };

    let columns: Vec<String> = kind.columns().iter().map(|c| format!("{}.{}", root, c)).collect();
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    query = query.select(&columns);

    query.order_by = root_order
        .into_iter()
        .map(|o| OrderBy {
            expr: o.expr.qualify(root),
            direction: o.direction,
        })
        .collect();

    for node in joined {
        query = add_join(query, root, node);
    }
    query
}

fn add_join(mut query: SelectQuery, parent_alias: &str, node: &PlanNode) -> SelectQuery {
    let relation = node.relation;
    let target = relation.target;
    let alias = alias_of(node);

    let on = col(&format!("{}.{}", alias, relation.remote_column))
        .eq_expr(col(&format!("{}.{}", parent_alias, relation.local_column)));
    query = query.join_on(JoinType::Left, target.table(), Some(&alias), on);

    for column in target.columns() {
        query = query.select_expr(col(&format!("{}.{}", alias, column)), Some(&label(&alias, column)));
    }

    if relation.is_collection() {
        query = query.order_by_expr(
            col(&format!("{}.{}", alias, target.primary_key())),
            OrderDirection::Asc,
        );
    }

    for child in node.joined_children() {
        query = add_join(query, &alias, child);
    }
    query
}

fn fans_out(node: &PlanNode) -> bool {
    node.relation.is_collection() || node.joined_children().any(fans_out)
}

fn is_column(expr: &Expr, name: &str) -> bool {
    matches!(expr, Expr::Column(column) if column.name == name)
}

/// Fold joined rows into deduplicated graphs
pub(crate) fn assemble(
    kind: EntityKind,
    rows: &[ResultRow],
    joined: &[&PlanNode],
    unit_of_work: Uuid,
) -> OrmResult<Vec<EntityGraph>> {
    let mut graphs: Vec<EntityGraph> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        let id: i64 = row.get(kind.primary_key())?;
        let position = match positions.get(&id) {
            Some(position) => *position,
            None => {
                let mut graph = EntityGraph::from_row(kind, pick(row, kind, None), unit_of_work)?;
                for node in joined {
                    graph.ensure_loaded(node.relation.name, node.relation.relationship_type);
                }
                graphs.push(graph);
                positions.insert(id, graphs.len() - 1);
                graphs.len() - 1
            }
        };

        let graph = &mut graphs[position];
        for node in joined {
            merge_row(graph, node, row, unit_of_work)?;
        }
    }
    Ok(graphs)
}

fn merge_row(parent: &mut EntityGraph, node: &PlanNode, row: &ResultRow, unit_of_work: Uuid) -> OrmResult<()> {
    let relation = node.relation;
    let target = relation.target;
    let alias = alias_of(node);

    parent.ensure_loaded(relation.name, relation.relationship_type);

    // Outer join found nothing for this parent
    let id = match row.value(&label(&alias, target.primary_key())).and_then(DatabaseValue::as_i64) {
        Some(id) => id,
        None => return Ok(()),
    };

    let child = parent.merge_related(relation.name, relation.relationship_type, id, || {
        let mut graph = EntityGraph::from_row(target, pick(row, target, Some(&alias)), unit_of_work)?;
        for grandchild in node.joined_children() {
            graph.ensure_loaded(grandchild.relation.name, grandchild.relation.relationship_type);
        }
        Ok(graph)
    })?;

    for grandchild in node.joined_children() {
        merge_row(child, grandchild, row, unit_of_work)?;
    }
    Ok(())
}

/// Cut one entity's columns out of a joined row, restoring plain labels
fn pick(row: &ResultRow, kind: EntityKind, alias: Option<&str>) -> ResultRow {
    let mut picked = ResultRow::default();
    for column in kind.columns() {
        let value = match alias {
            Some(alias) => row.value(&label(alias, column)),
            None => row.value(column),
        };
        picked.push(*column, value.cloned().unwrap_or(DatabaseValue::Null));
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SqlDialect;
    use crate::loading::plan::LoadPlan;
    use crate::loading::strategy::LoadStrategy;

    fn plan(kind: EntityKind, path: &str) -> LoadPlan {
        LoadPlan::build(kind, &[(path.to_string(), LoadStrategy::Joined)]).unwrap()
    }

    #[test]
    fn test_to_one_join_shape() {
        let plan = plan(EntityKind::Product, "manufacturer");
        let joined: Vec<&PlanNode> = plan.joined().collect();
        let level = LevelQuery {
            filter: Some(col("price").gt(100)),
            ..LevelQuery::default()
        };
        let (sql, params) = build_query(EntityKind::Product, &level, &joined).to_sql(SqlDialect::PostgreSQL);

        assert!(sql.starts_with("SELECT products.product_id, products.name,"));
        assert!(sql.contains("manufacturer.name AS manufacturer__name"));
        assert!(sql.contains(
            "FROM products LEFT JOIN manufacturers AS manufacturer ON manufacturer.manufacturer_id = products.manufacturer_id"
        ));
        assert!(sql.ends_with("WHERE products.price > $1 ORDER BY products.product_id ASC"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_paged_to_many_join_limits_parents() {
        let plan = plan(EntityKind::Order, "order_items.product");
        let joined: Vec<&PlanNode> = plan.joined().collect();
        let level = LevelQuery {
            limit: Some(2),
            ..LevelQuery::default()
        };
        let (sql, _) = build_query(EntityKind::Order, &level, &joined).to_sql(SqlDialect::PostgreSQL);

        assert!(sql.contains("FROM (SELECT * FROM orders ORDER BY order_id ASC LIMIT 2) AS orders"));
        assert!(sql.contains("LEFT JOIN products AS order_items__product ON order_items__product.product_id = order_items.product_id"));
        assert!(sql.ends_with("ORDER BY orders.order_id ASC, order_items.order_item_id ASC"));
    }

    #[test]
    fn test_assemble_dedupes_repeated_parents() {
        let plan = plan(EntityKind::Manufacturer, "products");
        let joined: Vec<&PlanNode> = plan.joined().collect();

        let row = |product: Option<i32>| {
            let mut row = ResultRow::default();
            for column in EntityKind::Manufacturer.columns() {
                let value = if *column == "manufacturer_id" {
                    DatabaseValue::Int32(1)
                } else {
                    DatabaseValue::from("x")
                };
                row.push(*column, value);
            }
            for column in EntityKind::Product.columns() {
                let value = match (*column, product) {
                    (_, None) => DatabaseValue::Null,
                    ("product_id", Some(id)) => DatabaseValue::Int32(id),
                    ("manufacturer_id", Some(_)) => DatabaseValue::Int32(1),
                    ("category_id", Some(_)) => DatabaseValue::Null,
                    (_, Some(_)) => DatabaseValue::from("y"),
                };
                row.push(label("products", column), value);
            }
            row
        };

        let rows = vec![row(Some(10)), row(Some(11)), row(Some(10))];
        let graphs = assemble(EntityKind::Manufacturer, &rows, &joined, Uuid::new_v4()).unwrap();
        assert_eq!(graphs.len(), 1);
        let ids: Vec<i64> = graphs[0].many("products").unwrap().iter().map(EntityGraph::id).collect();
        assert_eq!(ids, vec![10, 11]);

        let empty = assemble(EntityKind::Manufacturer, &[row(None)], &joined, Uuid::new_v4()).unwrap();
        assert!(empty[0].many("products").unwrap().is_empty());
    }
}
