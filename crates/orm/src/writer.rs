//! Aggregate writer
//!
//! Multi-row writes that must land together. An order and its line items are
//! written inside one transaction in a fixed order: header insert, item
//! inserts, total update, commit. Bulk updates compile to a single set-based
//! UPDATE and never read the rows they change.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, warn};

use crate::backends::DatabaseValue;
use crate::error::{OrmError, OrmResult};
use crate::query::{col, Condition, Expr, InsertStatement, SelectQuery, Statement, UpdateStatement};
use crate::schema::{CategoryTree, EntityKind, Insertable, NewOrder, NewOrderItem, OrderStatus};
use crate::session::UnitOfWork;
use crate::transaction::Transaction;

/// Decimal places order totals are stored with
pub const MONEY_SCALE: u32 = 2;

pub(crate) const PARENT_CATEGORY_COLUMN: &str = "parent_category_id";

/// One column change of a bulk update
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Set(DatabaseValue),
    /// Add to the current value (negative to subtract)
    Increment(DatabaseValue),
    SetNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub column: String,
    pub change: Change,
}

impl FieldChange {
    pub fn set<V: Into<DatabaseValue>>(column: &str, value: V) -> Self {
        Self {
            column: column.to_string(),
            change: Change::Set(value.into()),
        }
    }

    pub fn increment<V: Into<DatabaseValue>>(column: &str, amount: V) -> Self {
        Self {
            column: column.to_string(),
            change: Change::Increment(amount.into()),
        }
    }

    pub fn set_null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            change: Change::SetNull,
        }
    }
}

/// Sum of the line totals, rounded half-even to cents
pub fn order_total(items: &[NewOrderItem]) -> Decimal {
    items
        .iter()
        .map(NewOrderItem::line_total)
        .sum::<Decimal>()
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

impl UnitOfWork {
    /// Write an order and its items atomically, returning the new order id.
    ///
    /// Every payload is checked before the transaction opens. Any failure
    /// after that, including cancellation, rolls the whole order back.
    pub async fn create_order(&mut self, header: NewOrder, items: Vec<NewOrderItem>) -> OrmResult<i64> {
        header.validate()?;
        for item in &items {
            item.validate()?;
        }

        let mut tx = self.begin().await?;
        match write_order(&mut tx, &header, &items).await {
            Ok(order_id) => {
                tx.commit().await?;
                info!(order_id, items = items.len(), "order created");
                Ok(order_id)
            }
            Err(err) => {
                warn!(error = %err, "order write failed; rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Apply `changes` to every row of `kind` matching `filter` with one
    /// UPDATE, returning the number of rows the store reports as changed
    pub async fn bulk_update(
        &mut self,
        kind: EntityKind,
        filter: Condition,
        changes: Vec<FieldChange>,
    ) -> OrmResult<u64> {
        if changes.is_empty() {
            return Err(OrmError::Query(format!("bulk update of {} changes nothing", kind.table())));
        }

        let mut statement = UpdateStatement::table(kind.table());
        for FieldChange { column, change } in changes {
            if !kind.has_column(&column) || column == kind.primary_key() {
                return Err(OrmError::Query(format!(
                    "column {} cannot be updated on {}",
                    column,
                    kind.table()
                )));
            }
            // a set-based move cannot be checked for cycles row by row
            if kind == EntityKind::Category && column == PARENT_CATEGORY_COLUMN {
                return Err(OrmError::Query(format!(
                    "{}.{} is moved one category at a time with reparent_category",
                    kind.table(),
                    column
                )));
            }
            statement = match change {
                Change::Set(value) => statement.set(&column, value),
                Change::Increment(amount) => statement.set_expr(&column, col(&column).plus(amount)),
                Change::SetNull => statement.set_null(&column),
            };
        }
        if kind.tracks_updates() && !statement.sets("updated_at") {
            statement = statement.set_expr("updated_at", Expr::Now);
        }

        let result = self.execute(&statement.filter(filter).into()).await?;
        info!(table = kind.table(), rows = result.rows_affected, "bulk update applied");
        Ok(result.rows_affected)
    }

    /// Move a category under `new_parent` (or make it a root).
    ///
    /// The hierarchy is read inside the same transaction as the update, and a
    /// move that would make the category its own ancestor is rejected with
    /// `category_no_cycle`.
    pub async fn reparent_category(&mut self, category_id: i64, new_parent: Option<i64>) -> OrmResult<()> {
        let statement = UpdateStatement::table(EntityKind::Category.table())
            .set(PARENT_CATEGORY_COLUMN, new_parent)
            .filter(col("category_id").eq(category_id));
        self.update_category_in_hierarchy(category_id, new_parent, statement.into())
            .await
    }

    /// Run `statement`, which moves `category_id` under `new_parent`, only if
    /// the hierarchy read in the same transaction stays acyclic
    pub(crate) async fn update_category_in_hierarchy(
        &mut self,
        category_id: i64,
        new_parent: Option<i64>,
        statement: Statement,
    ) -> OrmResult<()> {
        let mut tx = self.begin().await?;

        let hierarchy = SelectQuery::table(EntityKind::Category.table())
            .select(&["category_id", "name", PARENT_CATEGORY_COLUMN])
            .order_by("category_id");
        let mut tree = CategoryTree::from_rows(&tx.fetch_all(&hierarchy).await?)?;
        tree.set_parent(category_id, new_parent)?;

        tx.execute(&statement).await?;
        tx.commit().await
    }

    pub async fn update_order_status(&mut self, order_id: i64, status: OrderStatus) -> OrmResult<()> {
        self.update(EntityKind::Order, order_id, vec![("status", status.into())]).await
    }
}

async fn write_order(tx: &mut Transaction<'_>, header: &NewOrder, items: &[NewOrderItem]) -> OrmResult<i64> {
    let insert_header = InsertStatement::into_table(EntityKind::Order.table())
        .set_values(header.to_fields())
        .returning(EntityKind::Order.primary_key());
    let order_id = tx.execute(&insert_header.into()).await?.generated_key()?;

    for item in items {
        let insert_item = InsertStatement::into_table(EntityKind::OrderItem.table())
            .set_values(item.to_fields(order_id))
            .returning(EntityKind::OrderItem.primary_key());
        tx.execute(&insert_item.into()).await?;
    }

    let total: Statement = UpdateStatement::table(EntityKind::Order.table())
        .set("total_amount", order_total(items))
        .filter(col("order_id").eq(order_id))
        .into();
    tx.execute(&total).await?;
    Ok(order_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_order_total_rounds_half_even() {
        let items = vec![
            NewOrderItem::new(1, 1, dec("10.125")),
            NewOrderItem::new(2, 2, dec("5.00")).with_discount(dec("10")),
        ];
        // 10.125 + 9.00 = 19.125 -> 19.12
        assert_eq!(order_total(&items), dec("19.12"));
        assert_eq!(order_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_field_change_constructors() {
        assert_eq!(FieldChange::increment("quantity_in_stock", 10).change, Change::Increment(10.into()));
        assert_eq!(FieldChange::set_null("website").change, Change::SetNull);
    }
}
