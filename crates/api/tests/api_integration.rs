//! Integration tests for the order service and product service routers.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::routes::orders::OrderAppState;
use api::routes::products::ProductAppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, ProductId, ShopId, UserId};
use ledger::{HttpStockLedger, InMemoryStockLedger, NewProduct, ProductCatalog, StockLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderStore, OrderStore};
use saga::{
    CreateOrderRequest, LocalDelayQueue, OrderCoordinator, OrderLine, SagaConfig, SagaError,
};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            api::server::install_metrics().expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn saga_config() -> SagaConfig {
    SagaConfig::default().with_order_ttl(Duration::from_secs(60))
}

struct OrderService {
    app: axum::Router,
    ledger: InMemoryStockLedger,
}

impl OrderService {
    async fn product(&self, stock: i32, cents: i64) -> ProductId {
        self.ledger
            .create_product(NewProduct::new(
                ShopId::new(1),
                "Widget",
                Money::from_cents(cents),
                stock,
            ))
            .await
            .unwrap()
            .id
    }

    async fn counters(&self, id: ProductId) -> (i32, i32) {
        let product = self.ledger.product(id).await.unwrap();
        (product.stock, product.on_hold_stock)
    }
}

fn order_service() -> OrderService {
    let ledger = InMemoryStockLedger::new();
    let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let remote: Arc<dyn StockLedger> = Arc::new(ledger.clone());
    let coordinator = OrderCoordinator::new(
        orders,
        remote,
        LocalDelayQueue::new("order-expiry"),
        saga_config(),
    );
    let state = Arc::new(OrderAppState {
        coordinator: Arc::new(coordinator),
    });
    OrderService {
        app: api::create_order_app(state, get_metrics_handle()),
        ledger,
    }
}

fn product_service(ledger: InMemoryStockLedger, api_key: Option<&str>) -> axum::Router {
    let state = Arc::new(ProductAppState {
        catalog: Arc::new(ledger),
    });
    api::create_product_app(state, get_metrics_handle(), api_key.map(str::to_string))
}

fn order_body(product: ProductId, quantity: i32, cents: i64, total: i64) -> Value {
    json!({
        "user_id": 7,
        "shop_id": 1,
        "total_price": total,
        "items": [{ "product_id": product, "quantity": quantity, "price": cents }]
    })
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let service = order_service();
    let (status, json) = send(&service.app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "order-service");
}

#[tokio::test]
async fn test_create_order_holds_stock() {
    let service = order_service();
    let p = service.product(10, 1500).await;

    let (status, json) = send(
        &service.app,
        post_json("/orders", &order_body(p, 10, 1500, 15_000)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["total_items"], 10);
    assert_eq!(json["total_price"], 15_000);
    assert!(json["order_id"].as_i64().is_some());
    assert_eq!(service.counters(p).await, (0, 10));
}

#[tokio::test]
async fn test_insufficient_stock_is_conflict() {
    let service = order_service();
    let p = service.product(10, 1500).await;
    send(
        &service.app,
        post_json("/orders", &order_body(p, 10, 1500, 15_000)),
    )
    .await;

    let (status, json) = send(
        &service.app,
        post_json("/orders", &order_body(p, 1, 1500, 1500)),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "insufficient_stock");
    assert_eq!(service.counters(p).await, (0, 10));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let service = order_service();
    let (status, json) = send(
        &service.app,
        post_json("/orders", &order_body(ProductId::new(404), 1, 100, 100)),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn test_wrong_total_is_bad_request() {
    let service = order_service();
    let p = service.product(10, 1500).await;

    let (status, json) = send(
        &service.app,
        post_json("/orders", &order_body(p, 2, 1500, 2999)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "validation");
    assert_eq!(service.counters(p).await, (10, 0));
}

#[tokio::test]
async fn test_get_order_returns_items() {
    let service = order_service();
    let p = service.product(10, 250).await;
    let (_, created) = send(
        &service.app,
        post_json("/orders", &order_body(p, 4, 250, 1000)),
    )
    .await;
    let id = created["order_id"].as_i64().unwrap();

    let (status, json) = send(&service.app, get(&format!("/orders/{id}"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["items"][0]["quantity"], 4);
    assert_eq!(json["items"][0]["item_price"], 250);
}

#[tokio::test]
async fn test_get_missing_or_malformed_order() {
    let service = order_service();

    let (status, json) = send(&service.app, get("/orders/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");

    let (status, _) = send(&service.app, get("/orders/not-a-number")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_order_commits_held_stock() {
    let service = order_service();
    let p = service.product(10, 100).await;
    let (_, created) = send(
        &service.app,
        post_json("/orders", &order_body(p, 3, 100, 300)),
    )
    .await;
    let id = created["order_id"].as_i64().unwrap();

    let (status, json) = send(
        &service.app,
        post_json(&format!("/orders/{id}/confirm"), &Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");
    assert_eq!(service.counters(p).await, (7, 0));

    let (status, json) = send(
        &service.app,
        post_json(&format!("/orders/{id}/confirm"), &Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "conflict");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let service = order_service();
    let p = service.product(5, 100).await;
    send(
        &service.app,
        post_json("/orders", &order_body(p, 1, 100, 100)),
    )
    .await;

    let response = service.app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}

#[tokio::test]
async fn test_product_create_and_list() {
    let app = product_service(InMemoryStockLedger::new(), None);

    let (status, created) = send(
        &app,
        post_json(
            "/products",
            &json!({ "shop_id": 3, "name": "Lamp", "price": 4200, "stock": 5 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();

    let (status, json) = send(&app, get(&format!("/products?ids={id},999"))).await;
    assert_eq!(status, StatusCode::OK);
    let products = json["products"].as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["stock"], 5);
    assert_eq!(products[0]["on_hold_stock"], 0);

    let (status, _) = send(&app, get("/products?ids=1,abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_create_rejects_negative_stock() {
    let app = product_service(InMemoryStockLedger::new(), None);
    let (status, json) = send(
        &app,
        post_json(
            "/products",
            &json!({ "shop_id": 3, "name": "Lamp", "price": 4200, "stock": -1 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_product");
}

#[tokio::test]
async fn test_hold_release_and_audits() {
    let ledger = InMemoryStockLedger::new();
    let p = ledger
        .create_product(NewProduct::new(
            ShopId::new(1),
            "Widget",
            Money::from_cents(100),
            10,
        ))
        .await
        .unwrap()
        .id;
    let app = product_service(ledger.clone(), None);

    let hold = json!({ "order_id": 1, "items": [{ "product_id": p, "quantity": 10 }] });
    let (status, json) = send(&app, post_json("/products/hold-stock", &hold)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["audits"][0]["status"], "held");

    let conflict = json!({ "order_id": 2, "items": [{ "product_id": p, "quantity": 1 }] });
    let (status, json) = send(&app, post_json("/products/hold-stock", &conflict)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "insufficient_stock");
    assert_eq!(json["available"], 0);

    let release = json!({ "order_id": 1 });
    let (status, json) = send(&app, post_json("/products/release-stock", &release)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["units"], 10);

    let (status, json) = send(&app, post_json("/products/release-stock", &release)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["audits_closed"], 0);

    let (status, json) = send(&app, get("/holds/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["status"], "cancelled");

    let product = ledger.product(p).await.unwrap();
    assert_eq!((product.stock, product.on_hold_stock), (10, 0));
}

#[tokio::test]
async fn test_malformed_hold_order_id_is_json_bad_request() {
    let app = product_service(InMemoryStockLedger::new(), None);

    for uri in ["/holds/abc", "/holds/0"] {
        let (status, json) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["code"], "validation", "{uri}");
    }

    let (status, json) = send(&app, get("/holds/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_stock_endpoints_require_api_key() {
    let app = product_service(InMemoryStockLedger::new(), Some("secret"));
    let release = json!({ "order_id": 1 });

    let (status, json) = send(&app, post_json("/products/release-stock", &release)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "unauthorized");

    let mut wrong = post_json("/products/release-stock", &release);
    wrong
        .headers_mut()
        .insert("x-api-key", "guess".parse().unwrap());
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut right = post_json("/products/release-stock", &release);
    right
        .headers_mut()
        .insert("x-api-key", "secret".parse().unwrap());
    let (status, _) = send(&app, right).await;
    assert_eq!(status, StatusCode::OK);

    // Catalog reads stay open.
    let (status, _) = send(&app, get("/products?ids=1")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_order_service_holds_stock_through_product_service() {
    let ledger = InMemoryStockLedger::new();
    let p = ledger
        .create_product(NewProduct::new(
            ShopId::new(1),
            "Widget",
            Money::from_cents(1500),
            10,
        ))
        .await
        .unwrap()
        .id;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = product_service(ledger.clone(), Some("secret"));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let remote = HttpStockLedger::new(format!("http://{addr}"), Duration::from_secs(5))
        .unwrap()
        .with_api_key("secret");
    let coordinator = OrderCoordinator::new(
        InMemoryOrderStore::new(),
        remote,
        LocalDelayQueue::new("order-expiry"),
        saga_config(),
    );
    let request = |quantity: i32| CreateOrderRequest {
        user_id: UserId::new(7),
        shop_id: ShopId::new(1),
        total_price: Money::from_cents(1500).multiply(quantity),
        items: vec![OrderLine {
            product_id: p,
            quantity,
            price: Money::from_cents(1500),
        }],
    };

    let placed = coordinator.create_order(request(10)).await.unwrap();
    assert_eq!(placed.total_items, 10);
    let product = ledger.product(p).await.unwrap();
    assert_eq!((product.stock, product.on_hold_stock), (0, 10));

    let rejected = coordinator.create_order(request(1)).await;
    assert!(matches!(
        rejected,
        Err(SagaError::InsufficientStock { available: 0, .. })
    ));

    coordinator.confirm_order(placed.order_id).await.unwrap();
    let product = ledger.product(p).await.unwrap();
    assert_eq!((product.stock, product.on_hold_stock), (0, 0));
}
