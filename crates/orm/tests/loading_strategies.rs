mod common;

use std::collections::BTreeSet;

use common::{dec, storefront};
use storefront_orm::{
    col, AggregateRequest, EntityKind, ErrorKind, Expr, FetchRequest, Manufacturer, NewManufacturer, NewProduct,
    OrmError, ProjectionRequest, SelectQuery,
};

#[tokio::test]
async fn test_joined_loads_in_one_round_trip_without_duplicates() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let manufacturers = uow
        .fetch(&FetchRequest::new(EntityKind::Manufacturer).joined("products"))
        .await
        .unwrap();

    assert_eq!(uow.round_trips(), 1);
    assert_eq!(shop.backend.fetch_count(), 1);
    assert_eq!(manufacturers.len(), 5);
    let ids: BTreeSet<i64> = manufacturers.iter().map(|m| m.id()).collect();
    assert_eq!(ids.len(), 5);
    for manufacturer in &manufacturers {
        assert_eq!(manufacturer.many("products").unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_nested_joined_path_stays_single_query() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let orders = uow
        .fetch(&FetchRequest::new(EntityKind::Order).joined("order_items.product"))
        .await
        .unwrap();

    assert_eq!(uow.round_trips(), 1);
    let items: usize = orders.iter().map(|o| o.many("order_items").unwrap().len()).sum();
    assert_eq!(items, 11);
    for order in &orders {
        for item in order.many("order_items").unwrap() {
            let product = item.one("product").unwrap().unwrap();
            assert_eq!(product.id(), item.get::<i64>("product_id").unwrap());
        }
    }
}

#[tokio::test]
async fn test_batched_costs_one_query_per_level() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let manufacturers = uow
        .fetch(&FetchRequest::new(EntityKind::Manufacturer).batched("products"))
        .await
        .unwrap();

    assert_eq!(uow.round_trips(), 2);
    assert_eq!(manufacturers.len(), 5);
    let statements = shop.backend.statements();
    assert!(statements[1].contains("manufacturer_id IN ("), "{}", statements[1]);
}

#[tokio::test]
async fn test_batched_round_trips_do_not_grow_with_roots() {
    let shop = storefront().await;
    let mut seed = shop.store.unit_of_work();
    for n in 0..495 {
        let maker = seed
            .insert(&NewManufacturer::new(format!("Maker {}", n), "Nowhere"))
            .await
            .unwrap();
        let product = NewProduct {
            name: format!("Widget {}", n),
            sku: format!("WID-{}", n),
            price: dec("1.00"),
            manufacturer_id: Some(maker),
            ..NewProduct::default()
        };
        seed.insert(&product).await.unwrap();
    }
    shop.backend.reset_counters();

    let mut uow = shop.store.unit_of_work();
    let manufacturers = uow
        .fetch(&FetchRequest::new(EntityKind::Manufacturer).batched("products"))
        .await
        .unwrap();

    assert_eq!(manufacturers.len(), 500);
    assert_eq!(uow.round_trips(), 2);
}

#[tokio::test]
async fn test_lazy_resolution_is_n_plus_one() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let mut orders = uow.fetch(&FetchRequest::new(EntityKind::Order)).await.unwrap();
    assert_eq!(uow.round_trips(), 1);
    assert!(!orders[0].is_loaded("order_items"));
    assert!(matches!(orders[0].many("order_items"), Err(OrmError::NotLoaded { .. })));

    for order in &mut orders {
        let items = uow.load_many(order, "order_items").await.unwrap();
        assert!(!items.is_empty());
    }
    assert_eq!(uow.round_trips(), 1 + orders.len());

    // Already loaded: free
    uow.resolve(&mut orders[0], "order_items").await.unwrap();
    assert_eq!(uow.round_trips(), 1 + orders.len());
}

#[tokio::test]
async fn test_lazy_null_key_resolves_without_query() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let cable = *shop.products.last().unwrap();
    let mut product = uow.get(EntityKind::Product, cable).await.unwrap();
    let before = uow.round_trips();

    assert!(uow.load_one(&mut product, "manufacturer").await.unwrap().is_none());
    assert_eq!(uow.round_trips(), before);
}

#[tokio::test]
async fn test_subquery_keys_children_by_parent_query() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let orders = uow
        .fetch(
            &FetchRequest::new(EntityKind::Order)
                .filter(col("customer_name").ne("Linus"))
                .subquery("order_items.product"),
        )
        .await
        .unwrap();

    assert_eq!(orders.len(), 4);
    assert_eq!(uow.round_trips(), 3);
    let statements = shop.backend.statements();
    assert!(statements[1].contains("IN (SELECT order_id FROM orders"), "{}", statements[1]);

    let products: BTreeSet<i64> = orders
        .iter()
        .flat_map(|o| o.many("order_items").unwrap())
        .map(|item| item.one("product").unwrap().unwrap().id())
        .collect();
    assert!(!products.contains(&shop.products[6]));
}

#[tokio::test]
async fn test_strategies_agree_on_graph_shape() {
    let shop = storefront().await;
    let mut results = Vec::new();
    for request in [
        FetchRequest::new(EntityKind::Category).joined("products.manufacturer"),
        FetchRequest::new(EntityKind::Category).batched("products.manufacturer"),
        FetchRequest::new(EntityKind::Category).subquery("products.manufacturer"),
    ] {
        let mut uow = shop.store.unit_of_work();
        let categories = uow.fetch(&request).await.unwrap();
        let shape: Vec<(i64, Vec<(i64, Option<i64>)>)> = categories
            .iter()
            .map(|c| {
                let products: Vec<_> = c
                    .many("products")
                    .unwrap()
                    .iter()
                    .map(|p| (p.id(), p.one("manufacturer").unwrap().map(|m| m.id())))
                    .collect();
                (c.id(), products)
            })
            .collect();
        results.push(shape);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[tokio::test]
async fn test_typed_records_carry_loaded_relations() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let manufacturers: Vec<Manufacturer> = uow
        .fetch_as(&FetchRequest::new(EntityKind::Manufacturer).batched("products"))
        .await
        .unwrap();
    let bosch = manufacturers.iter().find(|m| m.name == "Bosch").unwrap();
    assert!(bosch.products.is_loaded());
    assert_eq!(bosch.products.get().map(<[_]>::len), Some(2));
}

#[tokio::test]
async fn test_unknown_path_is_rejected_before_any_query() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let err = uow
        .fetch(&FetchRequest::new(EntityKind::Product).batched("manufacturer.warehouse"))
        .await
        .unwrap_err();

    assert!(matches!(err, OrmError::InvalidPath { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(uow.round_trips(), 0);
}

#[tokio::test]
async fn test_unavailable_store_surfaces_as_error() {
    let shop = storefront().await;
    shop.backend.set_unavailable(true);
    let mut uow = shop.store.unit_of_work();

    let err = uow
        .fetch(&FetchRequest::new(EntityKind::Order).batched("order_items"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_graph_from_closed_unit_of_work_is_stale() {
    let shop = storefront().await;
    let mut first = shop.store.unit_of_work();
    let mut order = first.get(EntityKind::Order, shop.orders[0]).await.unwrap();
    first.close();

    let mut second = shop.store.unit_of_work();
    let err = second.resolve(&mut order, "order_items").await.unwrap_err();
    assert!(matches!(err, OrmError::Stale { .. }));
    assert_eq!(second.round_trips(), 0);
}

#[tokio::test]
async fn test_projection_returns_only_requested_columns() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let rows = uow
        .project(
            &ProjectionRequest::new(EntityKind::Product, &["name", "price"])
                .filter(col("price").lt(dec("100")))
                .order_by("name"),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 2);
    assert_eq!(rows[0].get::<String>("name").unwrap(), "Cable");
    assert_eq!(rows[1].get::<String>("name").unwrap(), "Kettle");
    assert_eq!(rows[1].get::<rust_decimal::Decimal>("price").unwrap(), dec("39.99"));
}

#[tokio::test]
async fn test_aggregate_is_computed_by_the_store() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let rows = uow
        .aggregate(
            &AggregateRequest::new(EntityKind::Product)
                .select(&["category_id"])
                .count("*", "product_count")
                .group_by("category_id")
                .order_by("category_id"),
        )
        .await
        .unwrap();

    let kitchen = shop.categories[5];
    let row = rows
        .iter()
        .find(|r| r.get::<i64>("category_id").unwrap() == kitchen)
        .unwrap();
    assert_eq!(row.get::<i64>("product_count").unwrap(), 4);
    assert_eq!(uow.count(EntityKind::Product, None).await.unwrap(), 11);
    assert_eq!(uow.round_trips(), 2);
}

#[tokio::test]
async fn test_correlated_exists_filter() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();
    let kitchen = shop.categories[5];

    let kitchen_products = SelectQuery::table("products")
        .select(&["product_id"])
        .filter(col("products.manufacturer_id").eq_expr(col("manufacturers.manufacturer_id")))
        .where_eq("category_id", kitchen);
    let makers = uow
        .fetch(
            &FetchRequest::new(EntityKind::Manufacturer)
                .filter(storefront_orm::Condition::exists(kitchen_products))
                .order_by("name"),
        )
        .await
        .unwrap();

    let names: Vec<String> = makers.iter().map(|m| m.get("name").unwrap()).collect();
    assert_eq!(names, vec!["Bosch".to_string(), "Philips".to_string()]);
    assert_eq!(uow.round_trips(), 1);
}

#[tokio::test]
async fn test_scalar_subquery_comparison() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let average = SelectQuery::table("products").select_avg("price", None);
    let pricey = uow
        .fetch(&FetchRequest::new(EntityKind::Product).filter(col("price").gt_expr(Expr::subquery(average))))
        .await
        .unwrap();

    assert_eq!(pricey.len(), 6);
    assert!(pricey.iter().all(|p| p.get::<rust_decimal::Decimal>("price").unwrap() > dec("719")));
}

#[tokio::test]
async fn test_pricey_products_with_joined_manufacturer() {
    let shop = storefront().await;
    let mut uow = shop.store.unit_of_work();

    let products = uow
        .fetch(
            &FetchRequest::new(EntityKind::Product)
                .filter(col("price").gt(dec("100")))
                .joined("manufacturer"),
        )
        .await
        .unwrap();

    assert_eq!(uow.round_trips(), 1);
    assert_eq!(products.len(), 9);
    let ids: BTreeSet<i64> = products.iter().map(|p| p.id()).collect();
    assert_eq!(ids.len(), products.len());
    for product in &products {
        let maker = product.one("manufacturer").unwrap().unwrap();
        assert_eq!(Some(maker.id()), product.try_get::<i64>("manufacturer_id").unwrap());
    }
    assert_eq!(uow.round_trips(), 1);
}
