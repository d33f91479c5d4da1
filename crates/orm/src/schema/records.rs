//! Typed entity records and insert payloads
//!
//! Records are decoded from an [`EntityGraph`] after loading; their relation
//! fields mirror the graph's slots as [`Related`] / [`RelatedMany`] values.
//! Insert payloads carry the client-side invariant checks, reporting the same
//! constraint names the store would.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backends::{DatabaseValue, FromDatabaseValue};
use crate::error::{OrmError, OrmResult};
use crate::loading::EntityGraph;
use crate::relationships::{Related, RelatedMany};

use super::EntityKind;

/// A typed record decodable from a loaded entity graph
pub trait Entity: Sized {
    const KIND: EntityKind;

    fn from_graph(graph: &EntityGraph) -> OrmResult<Self>;

    fn id(&self) -> i64;
}

/// A payload that can be written as a new row of `KIND`
pub trait Insertable {
    const KIND: EntityKind;

    /// Client-side checks run before any statement is issued
    fn validate(&self) -> OrmResult<()> {
        Ok(())
    }

    /// Column/value pairs for the insert; store defaults fill the rest
    fn to_fields(&self) -> Vec<(&'static str, DatabaseValue)>;
}

/// Lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status '{}'", s))
    }
}

impl FromDatabaseValue for OrderStatus {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        String::from_database_value(value)?.parse()
    }
}

impl From<OrderStatus> for DatabaseValue {
    fn from(status: OrderStatus) -> Self {
        DatabaseValue::String(status.as_str().to_string())
    }
}

/// quantity × unit_price × (1 − discount_percent / 100), unrounded
pub fn line_total(quantity: i32, unit_price: Decimal, discount_percent: Decimal) -> Decimal {
    let hundred = Decimal::ONE_HUNDRED;
    Decimal::from(quantity) * unit_price * (hundred - discount_percent) / hundred
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manufacturer {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub founded_year: Option<i32>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub products: RelatedMany<Product>,
}

impl Entity for Manufacturer {
    const KIND: EntityKind = EntityKind::Manufacturer;

    fn from_graph(graph: &EntityGraph) -> OrmResult<Self> {
        Ok(Self {
            id: graph.get("manufacturer_id")?,
            name: graph.get("name")?,
            country: graph.get("country")?,
            founded_year: graph.try_get("founded_year")?,
            website: graph.try_get("website")?,
            created_at: graph.get("created_at")?,
            products: RelatedMany::from_graph(graph, "products")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parent_category_id: Option<i64>,
    pub parent: Related<Category>,
    pub children: RelatedMany<Category>,
    pub products: RelatedMany<Product>,
}

impl Entity for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn from_graph(graph: &EntityGraph) -> OrmResult<Self> {
        Ok(Self {
            id: graph.get("category_id")?,
            name: graph.get("name")?,
            description: graph.try_get("description")?,
            parent_category_id: graph.try_get("parent_category_id")?,
            parent: Related::from_graph(graph, "parent")?,
            children: RelatedMany::from_graph(graph, "children")?,
            products: RelatedMany::from_graph(graph, "products")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub quantity_in_stock: i32,
    pub manufacturer_id: Option<i64>,
    pub category_id: Option<i64>,
    pub weight_kg: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub manufacturer: Related<Manufacturer>,
    pub category: Related<Category>,
    pub order_items: RelatedMany<OrderItem>,
}

impl Entity for Product {
    const KIND: EntityKind = EntityKind::Product;

    fn from_graph(graph: &EntityGraph) -> OrmResult<Self> {
        Ok(Self {
            id: graph.get("product_id")?,
            name: graph.get("name")?,
            sku: graph.get("sku")?,
            description: graph.try_get("description")?,
            price: graph.get("price")?,
            quantity_in_stock: graph.get("quantity_in_stock")?,
            manufacturer_id: graph.try_get("manufacturer_id")?,
            category_id: graph.try_get("category_id")?,
            weight_kg: graph.try_get("weight_kg")?,
            is_active: graph.get("is_active")?,
            created_at: graph.get("created_at")?,
            updated_at: graph.get("updated_at")?,
            manufacturer: Related::from_graph(graph, "manufacturer")?,
            category: Related::from_graph(graph, "category")?,
            order_items: RelatedMany::from_graph(graph, "order_items")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub order_items: RelatedMany<OrderItem>,
}

impl Entity for Order {
    const KIND: EntityKind = EntityKind::Order;

    fn from_graph(graph: &EntityGraph) -> OrmResult<Self> {
        Ok(Self {
            id: graph.get("order_id")?,
            customer_name: graph.get("customer_name")?,
            customer_email: graph.get("customer_email")?,
            shipping_address: graph.get("shipping_address")?,
            order_date: graph.get("order_date")?,
            status: graph.get("status")?,
            total_amount: graph.get("total_amount")?,
            notes: graph.try_get("notes")?,
            order_items: RelatedMany::from_graph(graph, "order_items")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub order: Related<Order>,
    pub product: Related<Product>,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        line_total(self.quantity, self.unit_price, self.discount_percent)
    }
}

impl Entity for OrderItem {
    const KIND: EntityKind = EntityKind::OrderItem;

    fn from_graph(graph: &EntityGraph) -> OrmResult<Self> {
        Ok(Self {
            id: graph.get("order_item_id")?,
            order_id: graph.get("order_id")?,
            product_id: graph.get("product_id")?,
            quantity: graph.get("quantity")?,
            unit_price: graph.get("unit_price")?,
            discount_percent: graph.get("discount_percent")?,
            order: Related::from_graph(graph, "order")?,
            product: Related::from_graph(graph, "product")?,
        })
    }

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewManufacturer {
    pub name: String,
    pub country: String,
    pub founded_year: Option<i32>,
    pub website: Option<String>,
}

impl NewManufacturer {
    pub fn new(name: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country: country.into(),
            founded_year: None,
            website: None,
        }
    }
}

impl Insertable for NewManufacturer {
    const KIND: EntityKind = EntityKind::Manufacturer;

    fn to_fields(&self) -> Vec<(&'static str, DatabaseValue)> {
        vec![
            ("name", self.name.as_str().into()),
            ("country", self.country.as_str().into()),
            ("founded_year", self.founded_year.into()),
            ("website", self.website.clone().into()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub parent_category_id: Option<i64>,
}

impl NewCategory {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parent_category_id: None,
        }
    }

    pub fn child_of(name: impl Into<String>, parent_category_id: i64) -> Self {
        Self {
            parent_category_id: Some(parent_category_id),
            ..Self::root(name)
        }
    }
}

impl Insertable for NewCategory {
    const KIND: EntityKind = EntityKind::Category;

    fn to_fields(&self) -> Vec<(&'static str, DatabaseValue)> {
        vec![
            ("name", self.name.as_str().into()),
            ("description", self.description.clone().into()),
            ("parent_category_id", self.parent_category_id.into()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub quantity_in_stock: i32,
    pub manufacturer_id: Option<i64>,
    pub category_id: Option<i64>,
    pub weight_kg: Option<Decimal>,
    pub is_active: bool,
}

impl Default for NewProduct {
    fn default() -> Self {
        Self {
            name: String::new(),
            sku: String::new(),
            description: None,
            price: Decimal::ZERO,
            quantity_in_stock: 0,
            manufacturer_id: None,
            category_id: None,
            weight_kg: None,
            is_active: true,
        }
    }
}

impl Insertable for NewProduct {
    const KIND: EntityKind = EntityKind::Product;

    fn validate(&self) -> OrmResult<()> {
        if self.price < Decimal::ZERO {
            return Err(OrmError::constraint(
                "check_price_positive",
                format!("price {} is negative", self.price),
            ));
        }
        if self.quantity_in_stock < 0 {
            return Err(OrmError::constraint(
                "check_quantity_positive",
                format!("quantity_in_stock {} is negative", self.quantity_in_stock),
            ));
        }
        Ok(())
    }

    fn to_fields(&self) -> Vec<(&'static str, DatabaseValue)> {
        vec![
            ("name", self.name.as_str().into()),
            ("sku", self.sku.as_str().into()),
            ("description", self.description.clone().into()),
            ("price", self.price.into()),
            ("quantity_in_stock", self.quantity_in_stock.into()),
            ("manufacturer_id", self.manufacturer_id.into()),
            ("category_id", self.category_id.into()),
            ("weight_kg", self.weight_kg.into()),
            ("is_active", self.is_active.into()),
        ]
    }
}

/// Order header; `total_amount` is always computed by the writer
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub status: OrderStatus,
    pub notes: Option<String>,
}

impl Insertable for NewOrder {
    const KIND: EntityKind = EntityKind::Order;

    fn to_fields(&self) -> Vec<(&'static str, DatabaseValue)> {
        vec![
            ("customer_name", self.customer_name.as_str().into()),
            ("customer_email", self.customer_email.as_str().into()),
            ("shipping_address", self.shipping_address.as_str().into()),
            ("status", self.status.into()),
            ("notes", self.notes.clone().into()),
        ]
    }
}

/// Line item of an order that does not exist yet
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
}

impl NewOrderItem {
    pub fn new(product_id: i64, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            discount_percent: Decimal::ZERO,
        }
    }

    pub fn with_discount(mut self, discount_percent: Decimal) -> Self {
        self.discount_percent = discount_percent;
        self
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.quantity <= 0 {
            return Err(OrmError::constraint(
                "check_item_quantity_positive",
                format!("quantity {} must be greater than zero", self.quantity),
            ));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(OrmError::constraint(
                "check_unit_price_positive",
                format!("unit_price {} is negative", self.unit_price),
            ));
        }
        if self.discount_percent < Decimal::ZERO || self.discount_percent > Decimal::ONE_HUNDRED {
            return Err(OrmError::constraint(
                "check_discount_range",
                format!("discount_percent {} is outside 0..=100", self.discount_percent),
            ));
        }
        Ok(())
    }

    pub fn line_total(&self) -> Decimal {
        line_total(self.quantity, self.unit_price, self.discount_percent)
    }

    pub(crate) fn to_fields(&self, order_id: i64) -> Vec<(&'static str, DatabaseValue)> {
        vec![
            ("order_id", order_id.into()),
            ("product_id", self.product_id.into()),
            ("quantity", self.quantity.into()),
            ("unit_price", self.unit_price.into()),
            ("discount_percent", self.discount_percent.into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_order_status_round_trips_through_text() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("returned".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_string(&OrderStatus::Shipped).unwrap(), "\"shipped\"");
    }

    #[test]
    fn test_line_total_applies_discount() {
        let item = NewOrderItem::new(1, 3, dec("19.99")).with_discount(dec("10"));
        assert_eq!(item.line_total(), dec("53.973"));
        assert_eq!(NewOrderItem::new(1, 2, dec("5.00")).line_total(), dec("10.00"));
    }

    #[test]
    fn test_item_validation_names_constraints() {
        let zero = NewOrderItem::new(1, 0, dec("1.00"));
        assert_eq!(
            zero.validate().unwrap_err().constraint_name(),
            Some("check_item_quantity_positive")
        );

        let over = NewOrderItem::new(1, 1, dec("1.00")).with_discount(dec("100.5"));
        assert_eq!(over.validate().unwrap_err().constraint_name(), Some("check_discount_range"));

        let negative = NewOrderItem::new(1, 1, dec("-0.01"));
        assert_eq!(
            negative.validate().unwrap_err().constraint_name(),
            Some("check_unit_price_positive")
        );
    }

    #[test]
    fn test_product_validation() {
        let product = NewProduct {
            name: "Cable".into(),
            sku: "CBL-1".into(),
            price: dec("-1"),
            ..Default::default()
        };
        assert_eq!(product.validate().unwrap_err().constraint_name(), Some("check_price_positive"));

        let product = NewProduct {
            quantity_in_stock: -3,
            ..product
        };
        let product = NewProduct { price: dec("0"), ..product };
        assert_eq!(
            product.validate().unwrap_err().constraint_name(),
            Some("check_quantity_positive")
        );
        assert!(NewProduct::default().is_active);
    }
}
