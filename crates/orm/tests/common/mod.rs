//! Shared storefront fixture for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use storefront_orm::{
    InstrumentedPool, NewCategory, NewManufacturer, NewOrder, NewOrderItem, NewProduct, OrderStatus, SqliteBackend,
    Store,
};

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub struct Storefront {
    pub backend: InstrumentedPool,
    pub store: Store,
    pub manufacturers: Vec<i64>,
    pub categories: Vec<i64>,
    pub products: Vec<i64>,
    pub orders: Vec<i64>,
}

/// A fresh in-memory SQLite store with the schema installed, behind counters
pub async fn empty_store() -> (InstrumentedPool, Store) {
    let backend = InstrumentedPool::new(SqliteBackend::in_memory().await.unwrap());
    let store = Store::new(Arc::new(backend.clone()));
    (backend, store)
}

pub fn new_order(customer: &str) -> NewOrder {
    NewOrder {
        customer_name: customer.to_string(),
        customer_email: format!("{}@example.com", customer.to_lowercase()),
        shipping_address: "1 Main Street".to_string(),
        status: OrderStatus::Pending,
        notes: None,
    }
}

/// 5 manufacturers, 6 categories, 11 products and 5 orders.
///
/// Categories: Electronics > Computers > Laptops, Electronics > Phones,
/// Home > Kitchen. The last product has no manufacturer. Counters are reset
/// once seeding is done.
pub async fn storefront() -> Storefront {
    let (backend, store) = empty_store().await;
    let mut uow = store.unit_of_work();

    let mut manufacturers = Vec::new();
    for (name, country) in [
        ("Lenovo", "China"),
        ("Apple", "USA"),
        ("Samsung", "South Korea"),
        ("Bosch", "Germany"),
        ("Philips", "Netherlands"),
    ] {
        manufacturers.push(uow.insert(&NewManufacturer::new(name, country)).await.unwrap());
    }

    let electronics = uow.insert(&NewCategory::root("Electronics")).await.unwrap();
    let computers = uow.insert(&NewCategory::child_of("Computers", electronics)).await.unwrap();
    let laptops = uow.insert(&NewCategory::child_of("Laptops", computers)).await.unwrap();
    let phones = uow.insert(&NewCategory::child_of("Phones", electronics)).await.unwrap();
    let home = uow.insert(&NewCategory::root("Home")).await.unwrap();
    let kitchen = uow.insert(&NewCategory::child_of("Kitchen", home)).await.unwrap();
    let categories = vec![electronics, computers, laptops, phones, home, kitchen];

    let catalogue: [(&str, &str, &str, Option<usize>, i64); 11] = [
        ("ThinkPad X1", "LEN-X1", "1899.00", Some(0), laptops),
        ("IdeaCentre", "LEN-IC", "749.00", Some(0), computers),
        ("MacBook Air", "APL-MBA", "1299.00", Some(1), laptops),
        ("iPhone", "APL-IPH", "999.00", Some(1), phones),
        ("Galaxy S", "SAM-GS", "899.00", Some(2), phones),
        ("Galaxy Book", "SAM-GB", "1099.00", Some(2), laptops),
        ("Dishwasher", "BOS-DW", "649.00", Some(3), kitchen),
        ("Mixer", "BOS-MX", "129.50", Some(3), kitchen),
        ("Kettle", "PHI-KT", "39.99", Some(4), kitchen),
        ("Air Fryer", "PHI-AF", "149.00", Some(4), kitchen),
        ("Cable", "GEN-CB", "4.99", None, electronics),
    ];
    let mut products = Vec::new();
    for (name, sku, price, maker, category) in catalogue {
        let product = NewProduct {
            name: name.to_string(),
            sku: sku.to_string(),
            price: dec(price),
            quantity_in_stock: 25,
            manufacturer_id: maker.map(|index| manufacturers[index]),
            category_id: Some(category),
            ..NewProduct::default()
        };
        products.push(uow.insert(&product).await.unwrap());
    }

    let mut orders = Vec::new();
    let baskets: [(&str, &[(usize, i32)]); 5] = [
        ("Ada", &[(0, 1), (10, 3)]),
        ("Grace", &[(2, 1), (3, 2), (10, 1)]),
        ("Linus", &[(6, 1)]),
        ("Barbara", &[(7, 2), (8, 1), (9, 1)]),
        ("Ken", &[(4, 1), (5, 1)]),
    ];
    for (customer, basket) in baskets {
        let items = basket
            .iter()
            .map(|&(product, quantity)| NewOrderItem::new(products[product], quantity, dec(catalogue[product].2)))
            .collect();
        orders.push(uow.create_order(new_order(customer), items).await.unwrap());
    }

    backend.reset_counters();
    Storefront {
        backend,
        store,
        manufacturers,
        categories,
        products,
        orders,
    }
}
