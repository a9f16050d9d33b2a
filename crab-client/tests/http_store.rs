// crab-client/tests/http_store.rs
// 订单库 HTTP 客户端集成测试 (axum 模拟订单库)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use crab_client::{ClientConfig, ClientError, HttpClient};
use shared::models::{Destination, KitchenOrder, OrderItem, OrderStatus};

#[derive(Clone, Default)]
struct MockStore {
    orders: Arc<Mutex<Vec<KitchenOrder>>>,
    last_auth: Arc<Mutex<Option<String>>>,
}

async fn board(State(store): State<MockStore>, headers: HeaderMap) -> Json<Vec<KitchenOrder>> {
    *store.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(store.orders.lock().unwrap().clone())
}

async fn update_status(
    State(store): State<MockStore>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<KitchenOrder>, (StatusCode, String)> {
    let target: OrderStatus = query
        .get("status")
        .ok_or((StatusCode::BAD_REQUEST, "missing status".to_string()))?
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "bad status".to_string()))?;

    let mut orders = store.orders.lock().unwrap();
    let order = orders
        .iter_mut()
        .find(|o| o.id == id)
        .ok_or((StatusCode::NOT_FOUND, format!("order {id}")))?;
    if !order.status.can_transition_to(target) {
        return Err((
            StatusCode::CONFLICT,
            format!("{} -> {} not allowed", order.status, target),
        ));
    }
    order.status = target;
    order.version += 1;
    Ok(Json(order.clone()))
}

async fn complete(
    State(store): State<MockStore>,
    Path(id): Path<String>,
) -> Result<Json<KitchenOrder>, (StatusCode, String)> {
    let mut orders = store.orders.lock().unwrap();
    let pos = orders
        .iter()
        .position(|o| o.id == id)
        .ok_or((StatusCode::NOT_FOUND, format!("order {id}")))?;
    let mut order = orders.remove(pos);
    order.status = OrderStatus::Served;
    order.version += 1;
    Ok(Json(order))
}

async fn spawn_store(store: MockStore) -> String {
    let app = Router::new()
        .route("/orders/board", get(board))
        .route("/orders/{id}/status", put(update_status))
        .route("/orders/{id}/complete", post(complete))
        .with_state(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn seed() -> Vec<KitchenOrder> {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    vec![
        KitchenOrder::new("A1", 1, Destination::Table("T1".into()), at)
            .with_item(OrderItem::new(1, "Burger").with_station("grill")),
        KitchenOrder::new("A2", 2, Destination::Room("1204".into()), at)
            .with_item(OrderItem::new(2, "Tea").with_station("bar"))
            .with_status(OrderStatus::Ready),
    ]
}

#[tokio::test]
async fn test_fetch_board() {
    let store = MockStore::default();
    *store.orders.lock().unwrap() = seed();
    let base = spawn_store(store.clone()).await;

    let client = HttpClient::new(&ClientConfig::new(base).with_token("secret")).unwrap();
    let orders = client.fetch_board().await.unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id, "A1");
    assert_eq!(orders[1].destination, Destination::Room("1204".into()));
    assert_eq!(store.last_auth.lock().unwrap().as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn test_update_status_confirms_record() {
    let store = MockStore::default();
    *store.orders.lock().unwrap() = seed();
    let base = spawn_store(store).await;

    let client = HttpClient::new(&ClientConfig::new(base)).unwrap();
    let confirmed = client.update_status("A1", OrderStatus::Preparing).await.unwrap();

    assert_eq!(confirmed.status, OrderStatus::Preparing);
    assert_eq!(confirmed.version, 1);
}

#[tokio::test]
async fn test_disallowed_transition_is_conflict() {
    let store = MockStore::default();
    *store.orders.lock().unwrap() = seed();
    let base = spawn_store(store).await;

    let client = HttpClient::new(&ClientConfig::new(base)).unwrap();
    let err = client
        .update_status("A2", OrderStatus::Preparing)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Conflict(ref body) if body.contains("ready")));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn test_complete_and_not_found() {
    let store = MockStore::default();
    *store.orders.lock().unwrap() = seed();
    let base = spawn_store(store.clone()).await;

    let client = HttpClient::new(&ClientConfig::new(base)).unwrap();
    let served = client.complete("A2").await.unwrap();
    assert_eq!(served.status, OrderStatus::Served);
    assert_eq!(store.orders.lock().unwrap().len(), 1);

    let err = client.complete("A2").await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_unreachable_store_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        HttpClient::new(&ClientConfig::new(format!("http://{}", addr)).with_timeout_ms(500)).unwrap();
    let err = client.fetch_board().await.unwrap_err();
    assert!(matches!(err, ClientError::Http(_)));
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_server_error_status() {
    let app = Router::new().route(
        "/orders/board",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = HttpClient::new(&ClientConfig::new(format!("http://{}", addr))).unwrap();
    let err = client.fetch_board().await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 503, ref body } if body == "maintenance"));
}
