//! Storefront schema
//!
//! The five entity kinds, their table definitions, typed records and the
//! category hierarchy arena.

pub mod ddl;
pub mod hierarchy;
pub mod records;
pub mod tables;

use std::fmt;

use serde::Serialize;

use crate::backends::DatabaseValue;
use crate::query::col;

pub use ddl::{create_statements, drop_statements, install_schema};
pub use hierarchy::CategoryTree;
pub use records::*;
pub use tables::*;

/// Entity type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    Manufacturer,
    Category,
    Product,
    Order,
    OrderItem,
}

const MANUFACTURER_COLUMNS: &[&str] = &[
    "manufacturer_id",
    "name",
    "country",
    "founded_year",
    "website",
    "created_at",
];

const CATEGORY_COLUMNS: &[&str] = &["category_id", "name", "description", "parent_category_id"];

const PRODUCT_COLUMNS: &[&str] = &[
    "product_id",
    "name",
    "sku",
    "description",
    "price",
    "quantity_in_stock",
    "manufacturer_id",
    "category_id",
    "weight_kg",
    "is_active",
    "created_at",
    "updated_at",
];

const ORDER_COLUMNS: &[&str] = &[
    "order_id",
    "customer_name",
    "customer_email",
    "shipping_address",
    "order_date",
    "status",
    "total_amount",
    "notes",
];

const ORDER_ITEM_COLUMNS: &[&str] = &[
    "order_item_id",
    "order_id",
    "product_id",
    "quantity",
    "unit_price",
    "discount_percent",
];

impl EntityKind {
    /// All kinds in dependency order (referenced tables first)
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Manufacturer,
        EntityKind::Category,
        EntityKind::Product,
        EntityKind::Order,
        EntityKind::OrderItem,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Manufacturer => "manufacturers",
            EntityKind::Category => "categories",
            EntityKind::Product => "products",
            EntityKind::Order => "orders",
            EntityKind::OrderItem => "order_items",
        }
    }

    pub fn primary_key(&self) -> &'static str {
        match self {
            EntityKind::Manufacturer => "manufacturer_id",
            EntityKind::Category => "category_id",
            EntityKind::Product => "product_id",
            EntityKind::Order => "order_id",
            EntityKind::OrderItem => "order_item_id",
        }
    }

    /// Columns in table order; the primary key is always first
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Manufacturer => MANUFACTURER_COLUMNS,
            EntityKind::Category => CATEGORY_COLUMNS,
            EntityKind::Product => PRODUCT_COLUMNS,
            EntityKind::Order => ORDER_COLUMNS,
            EntityKind::OrderItem => ORDER_ITEM_COLUMNS,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Whether writes to this entity refresh `updated_at`
    pub fn tracks_updates(&self) -> bool {
        matches!(self, EntityKind::Product)
    }

    pub fn from_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.table() == table)
    }

    pub fn table_def(&self) -> TableDef {
        match self {
            EntityKind::Manufacturer => TableDef::build("manufacturers", |t| {
                t.id("manufacturer_id");
                t.string("name", Some(100)).not_null();
                t.string("country", Some(50)).not_null();
                t.integer("founded_year");
                t.string("website", Some(255));
                t.timestamp("created_at").not_null().default(DefaultValue::Now);
            }),
            EntityKind::Category => TableDef::build("categories", |t| {
                t.id("category_id");
                t.string("name", Some(50)).not_null();
                t.string("description", None);
                t.integer("parent_category_id");
                t.unique(&["name"]);
                t.foreign_key("parent_category_id", "categories", "category_id", ReferentialAction::SetNull);
            }),
            EntityKind::Product => TableDef::build("products", |t| {
                t.id("product_id");
                t.string("name", Some(200)).not_null();
                t.string("sku", Some(50)).not_null();
                t.string("description", None);
                t.numeric("price", 10, 2).not_null();
                t.integer("quantity_in_stock")
                    .not_null()
                    .default(DefaultValue::Value(DatabaseValue::Int32(0)));
                t.integer("manufacturer_id");
                t.integer("category_id");
                t.numeric("weight_kg", 8, 3);
                t.boolean("is_active")
                    .not_null()
                    .default(DefaultValue::Value(DatabaseValue::Bool(true)));
                t.timestamp("created_at").not_null().default(DefaultValue::Now);
                t.timestamp("updated_at").not_null().default(DefaultValue::Now);
                t.unique(&["sku"]);
                t.check("check_price_positive", col("price").gte(0));
                t.check("check_quantity_positive", col("quantity_in_stock").gte(0));
                t.foreign_key("manufacturer_id", "manufacturers", "manufacturer_id", ReferentialAction::SetNull);
                t.foreign_key("category_id", "categories", "category_id", ReferentialAction::SetNull);
            }),
            EntityKind::Order => TableDef::build("orders", |t| {
                t.id("order_id");
                t.string("customer_name", Some(100)).not_null();
                t.string("customer_email", Some(255)).not_null();
                t.string("shipping_address", None).not_null();
                t.timestamp("order_date").not_null().default(DefaultValue::Now);
                t.string("status", Some(20))
                    .not_null()
                    .default(DefaultValue::Value(OrderStatus::Pending.as_str().into()));
                t.numeric("total_amount", 12, 2)
                    .not_null()
                    .default(DefaultValue::Value(DatabaseValue::Int32(0)));
                t.string("notes", None);
                t.check(
                    "check_order_status",
                    col("status").is_in(OrderStatus::ALL.iter().map(|s| s.as_str())),
                );
            }),
            EntityKind::OrderItem => TableDef::build("order_items", |t| {
                t.id("order_item_id");
                t.integer("order_id").not_null();
                t.integer("product_id").not_null();
                t.integer("quantity").not_null();
                t.numeric("unit_price", 10, 2).not_null();
                t.numeric("discount_percent", 5, 2)
                    .not_null()
                    .default(DefaultValue::Value(DatabaseValue::Int32(0)));
                t.check("check_item_quantity_positive", col("quantity").gt(0));
                t.check("check_unit_price_positive", col("unit_price").gte(0));
                t.check("check_discount_range", col("discount_percent").between(0, 100));
                t.foreign_key("order_id", "orders", "order_id", ReferentialAction::Cascade);
                t.foreign_key("product_id", "products", "product_id", ReferentialAction::Restrict);
            }),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Manufacturer => "Manufacturer",
            EntityKind::Category => "Category",
            EntityKind::Product => "Product",
            EntityKind::Order => "Order",
            EntityKind::OrderItem => "OrderItem",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_match_table_defs() {
        for kind in EntityKind::ALL {
            let def = kind.table_def();
            assert_eq!(def.name, kind.table());
            assert_eq!(def.primary_key, kind.primary_key());
            assert_eq!(def.column_names(), kind.columns().to_vec(), "{}", kind);
            assert_eq!(kind.columns()[0], kind.primary_key());
            assert_eq!(EntityKind::from_table(kind.table()), Some(kind));
        }
    }

    #[test]
    fn test_delete_actions() {
        let products = EntityKind::Product.table_def();
        assert!(products
            .foreign_keys
            .iter()
            .all(|fk| fk.on_delete == ReferentialAction::SetNull));

        let items = EntityKind::OrderItem.table_def();
        let action = |column: &str| {
            items
                .foreign_keys
                .iter()
                .find(|fk| fk.column == column)
                .map(|fk| fk.on_delete)
        };
        assert_eq!(action("order_id"), Some(ReferentialAction::Cascade));
        assert_eq!(action("product_id"), Some(ReferentialAction::Restrict));
    }

    #[test]
    fn test_constraint_names() {
        let products = EntityKind::Product.table_def();
        assert_eq!(products.uniques[0].name, "products_sku_key");
        let checks: Vec<&str> = products.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(checks, vec!["check_price_positive", "check_quantity_positive"]);
        assert_eq!(EntityKind::Category.table_def().uniques[0].name, "categories_name_key");
    }
}
