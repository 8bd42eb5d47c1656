//! Catalog calls: query encoding, pagination and caching.

use redseam_client::ApiError;
use redseam_client::api::{ProductQuery, ProductSort};
use redseam_core::{Price, ProductId};
use redseam_integration_tests::{FakeRedseam, PER_PAGE, PRODUCT_COUNT};

#[tokio::test]
async fn test_listing_sends_filters_and_sort() {
    let fake = FakeRedseam::spawn().await;
    let client = fake.client();

    let page = client
        .list_products(&ProductQuery {
            page: 1,
            price_from: Some(50),
            price_to: Some(200),
            sort: ProductSort::PriceAscending,
        })
        .await
        .expect("list");

    let requests = fake.requests_to("GET", "/products");
    assert_eq!(requests.len(), 1);
    let query = requests[0].query.clone().expect("query string");
    assert_eq!(
        query,
        "page=1&filter%5Bprice_from%5D=50&filter%5Bprice_to%5D=200&sort=price"
    );

    // Prices are 15n + 0.5, so 50..=200 holds products 4 through 13.
    assert_eq!(page.meta.total, 10);
    assert_eq!(page.data.first().map(|p| p.id), Some(ProductId::new(4)));
    assert!(
        page.data
            .windows(2)
            .all(|pair| pair[0].price.amount() <= pair[1].price.amount())
    );
}

#[tokio::test]
async fn test_default_listing_is_newest_first_and_paginated() {
    let fake = FakeRedseam::spawn().await;
    let client = fake.client();

    let first = client
        .list_products(&ProductQuery::default())
        .await
        .expect("page 1");
    assert_eq!(first.data.len(), PER_PAGE);
    assert_eq!(first.data[0].id, ProductId::new(PRODUCT_COUNT));
    assert_eq!(first.meta.last_page, 3);

    let last = client
        .list_products(&ProductQuery {
            page: 3,
            ..ProductQuery::default()
        })
        .await
        .expect("page 3");
    assert_eq!(last.data.len(), 5);
    assert_eq!(last.meta.current_page, 3);

    let sorts: Vec<String> = fake
        .requests_to("GET", "/products")
        .into_iter()
        .filter_map(|r| r.query)
        .collect();
    assert!(sorts.iter().all(|q| q.ends_with("sort=created_at")));
}

#[tokio::test]
async fn test_descending_price_sort() {
    let fake = FakeRedseam::spawn().await;
    let page = fake
        .client()
        .list_products(&ProductQuery {
            sort: ProductSort::PriceDescending,
            ..ProductQuery::default()
        })
        .await
        .expect("list");

    assert_eq!(page.data[0].id, ProductId::new(PRODUCT_COUNT));
    assert!(fake.requests()[0].query.as_deref().is_some_and(|q| q.ends_with("sort=-price")));
}

#[tokio::test]
async fn test_inverted_price_range_is_rejected_locally() {
    let fake = FakeRedseam::spawn().await;
    let err = fake
        .client()
        .list_products(&ProductQuery {
            price_from: Some(300),
            price_to: Some(100),
            ..ProductQuery::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidRequest(_)));
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn test_product_detail_and_cache() {
    let fake = FakeRedseam::spawn().await;
    let client = fake.client();

    let product = client.get_product(ProductId::new(7)).await.expect("product");
    assert_eq!(product.name, "Product 7");
    assert_eq!(product.price, Price::from_cents(10550));
    assert_eq!(product.available_sizes, vec!["S", "M", "L"]);
    assert_eq!(product.brand.map(|b| b.name).as_deref(), Some("Redseam"));

    // Served from cache until invalidated.
    client.get_product(ProductId::new(7)).await.expect("cached");
    assert_eq!(fake.requests_to("GET", "/products/7").len(), 1);

    client.invalidate_product(ProductId::new(7)).await;
    client.get_product(ProductId::new(7)).await.expect("refetched");
    assert_eq!(fake.requests_to("GET", "/products/7").len(), 2);
}

#[tokio::test]
async fn test_listing_cache_is_keyed_by_query() {
    let fake = FakeRedseam::spawn().await;
    let client = fake.client();
    let cheap = ProductQuery {
        price_to: Some(100),
        ..ProductQuery::default()
    };

    client.list_products(&cheap).await.expect("first");
    client.list_products(&cheap).await.expect("cached");
    client
        .list_products(&ProductQuery::default())
        .await
        .expect("different query");

    assert_eq!(fake.requests_to("GET", "/products").len(), 2);

    client.invalidate_all().await;
    client.list_products(&cheap).await.expect("after invalidate");
    assert_eq!(fake.requests_to("GET", "/products").len(), 3);
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let fake = FakeRedseam::spawn().await;
    let err = fake
        .client()
        .get_product(ProductId::new(404))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref m) if m.contains("Product")));
}

#[tokio::test]
async fn test_server_errors_are_not_cached() {
    let fake = FakeRedseam::spawn().await;
    let client = fake.client();

    fake.fail_next("GET", "/products/3", 502, serde_json::json!({"message": "bad gateway"}));
    let err = client.get_product(ProductId::new(3)).await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 502, .. }));

    client.get_product(ProductId::new(3)).await.expect("retry succeeds");
}
