//! Relationship Registry - the fixed relation graph of the storefront schema

use crate::error::{OrmError, OrmResult};
use crate::schema::EntityKind;

use super::metadata::RelationDef;

use EntityKind::*;

static MANUFACTURER_RELATIONS: [RelationDef; 1] = [RelationDef::has_many(
    "products",
    Manufacturer,
    Product,
    "manufacturer_id",
    "manufacturer_id",
)];

// `children` is the reverse of `parent`: a lookup by parent_category_id,
// never a stored back-pointer.
static CATEGORY_RELATIONS: [RelationDef; 3] = [
    RelationDef::belongs_to("parent", Category, Category, "parent_category_id", "category_id"),
    RelationDef::has_many("children", Category, Category, "category_id", "parent_category_id"),
    RelationDef::has_many("products", Category, Product, "category_id", "category_id"),
];

static PRODUCT_RELATIONS: [RelationDef; 3] = [
    RelationDef::belongs_to("manufacturer", Product, Manufacturer, "manufacturer_id", "manufacturer_id"),
    RelationDef::belongs_to("category", Product, Category, "category_id", "category_id"),
    RelationDef::has_many("order_items", Product, OrderItem, "product_id", "product_id"),
];

static ORDER_RELATIONS: [RelationDef; 1] = [RelationDef::has_many(
    "order_items",
    Order,
    OrderItem,
    "order_id",
    "order_id",
)];

static ORDER_ITEM_RELATIONS: [RelationDef; 2] = [
    RelationDef::belongs_to("order", OrderItem, Order, "order_id", "order_id"),
    RelationDef::belongs_to("product", OrderItem, Product, "product_id", "product_id"),
];

/// Every relation declared on `kind`
pub fn relations_of(kind: EntityKind) -> &'static [RelationDef] {
    match kind {
        Manufacturer => &MANUFACTURER_RELATIONS,
        Category => &CATEGORY_RELATIONS,
        Product => &PRODUCT_RELATIONS,
        Order => &ORDER_RELATIONS,
        OrderItem => &ORDER_ITEM_RELATIONS,
    }
}

/// Look up a single relation by name
pub fn find_relation(kind: EntityKind, name: &str) -> OrmResult<&'static RelationDef> {
    relations_of(kind)
        .iter()
        .find(|relation| relation.name == name)
        .ok_or_else(|| OrmError::invalid_path(kind, name))
}

/// Resolve a dotted path such as `"order_items.product"` into its hops.
///
/// Fails with `InvalidPath` naming the full path if any segment is unknown.
pub fn resolve_path(kind: EntityKind, path: &str) -> OrmResult<Vec<&'static RelationDef>> {
    if path.is_empty() {
        return Err(OrmError::invalid_path(kind, path));
    }

    let mut hops = Vec::new();
    let mut current = kind;
    for segment in path.split('.') {
        let relation = find_relation(current, segment).map_err(|_| OrmError::invalid_path(kind, path))?;
        hops.push(relation);
        current = relation.target;
    }
    Ok(hops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_every_relation_references_real_columns() {
        for kind in EntityKind::ALL {
            for relation in relations_of(kind) {
                assert_eq!(relation.owner, kind);
                assert!(kind.has_column(relation.local_column), "{}.{}", kind, relation.name);
                assert!(
                    relation.target.has_column(relation.remote_column),
                    "{}.{}",
                    kind,
                    relation.name
                );
            }
        }
    }

    #[test]
    fn test_resolve_nested_path() {
        let hops = resolve_path(Order, "order_items.product.manufacturer").unwrap();
        let targets: Vec<EntityKind> = hops.iter().map(|h| h.target).collect();
        assert_eq!(targets, vec![OrderItem, Product, Manufacturer]);
    }

    #[test]
    fn test_unknown_segment_reports_full_path() {
        let err = resolve_path(Order, "order_items.vendor").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        match err {
            OrmError::InvalidPath { entity, path } => {
                assert_eq!(entity, "Order");
                assert_eq!(path, "order_items.vendor");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(resolve_path(Product, "").is_err());
        assert!(resolve_path(Product, "manufacturer..products").is_err());
    }

    #[test]
    fn test_self_referential_relations() {
        let parent = find_relation(Category, "parent").unwrap();
        let children = find_relation(Category, "children").unwrap();
        assert!(!parent.is_collection());
        assert!(children.is_collection());
        assert_eq!(parent.local_column, children.remote_column);
    }
}
