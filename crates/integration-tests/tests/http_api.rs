//! The JSON router driven in-process.
//!
//! Requests go through `tower::ServiceExt::oneshot` with a memory session
//! store, so no server or database is needed.

#![allow(clippy::unwrap_used)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use std::sync::Arc;

use serde_json::{Value, json};
use tower::ServiceExt;

use souq_integration_tests::{FlakyOrders, TestStore};
use souq_storefront::db::OrderRepository;

/// A browser: remembers the session cookie between requests.
struct Client {
    app: Router,
    cookie: Option<String>,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Client {
    fn new(app: &Router) -> Self {
        Self {
            app: app.clone(),
            cookie: None,
        }
    }

    async fn get(&mut self, uri: &str) -> Reply {
        self.send(Method::GET, uri, None, &[]).await
    }

    async fn post(&mut self, uri: &str, body: Value) -> Reply {
        self.send(Method::POST, uri, Some(body), &[]).await
    }

    async fn send(
        &mut self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        Reply {
            status,
            headers,
            body,
        }
    }
}

fn checkout_body(email: &str) -> Value {
    json!({
        "name": "Mona Adel",
        "email": email,
        "phone": "010-1234-5678",
        "address": "12 Tahrir St",
        "city": "Cairo",
        "region": "Cairo",
        "payment_method": "cash_on_delivery",
    })
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());

    let live = client.get("/health").await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body, "ok");

    let ready = client.get("/health/ready").await;
    assert_eq!(ready.status, StatusCode::OK);
}

// ============================================================================
// Cart
// ============================================================================

#[tokio::test]
async fn test_cart_mutations_trigger_update() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());

    let added = client
        .post("/cart/add", json!({ "product_id": "r1", "quantity": 2 }))
        .await;
    assert_eq!(added.status, StatusCode::OK);
    assert_eq!(added.headers.get("hx-trigger").unwrap(), "cart-updated");
    assert_eq!(added.body["item_count"], 2);
    assert_eq!(added.body["items"][0]["name"], "Product r1");

    client.post("/cart/add", json!({ "product_id": "r2" })).await;
    client.post("/cart/add", json!({ "product_id": "r1" })).await;

    let cart = client.get("/cart").await;
    assert_eq!(cart.body["item_count"], 4);
    assert_eq!(cart.body["items"][0]["product_id"], "r1");
    assert_eq!(cart.body["items"][0]["quantity"], 3);
    assert_eq!(cart.body["currency"], "EGP");

    let updated = client
        .post("/cart/update", json!({ "product_id": "r1", "quantity": 0 }))
        .await;
    assert_eq!(updated.headers.get("hx-trigger").unwrap(), "cart-updated");
    assert_eq!(updated.body["items"].as_array().unwrap().len(), 1);

    client.post("/cart/remove", json!({ "product_id": "r2" })).await;
    let count = client.get("/cart/count").await;
    assert_eq!(count.body["count"], 0);
}

#[tokio::test]
async fn test_carts_are_per_session() {
    let store = TestStore::new();
    let app = store.app();
    let mut first = Client::new(&app);
    let mut second = Client::new(&app);

    first.post("/cart/add", json!({ "product_id": "r1" })).await;

    assert_eq!(first.get("/cart/count").await.body["count"], 1);
    assert_eq!(second.get("/cart/count").await.body["count"], 0);
}

#[tokio::test]
async fn test_unknown_and_unavailable_products_rejected() {
    let mut hidden = souq_integration_tests::product("gone", 100);
    hidden.available = false;
    let store = TestStore::with_products([hidden]);
    let mut client = Client::new(&store.app());

    let unknown = client.post("/cart/add", json!({ "product_id": "nope" })).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let unavailable = client.post("/cart/add", json!({ "product_id": "gone" })).await;
    assert_eq!(unavailable.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_quote() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());
    client
        .post("/cart/add", json!({ "product_id": "r1", "quantity": 2 }))
        .await;

    let quote = client
        .post("/checkout/quote", json!({ "region": "alexandria" }))
        .await;
    assert_eq!(quote.status, StatusCode::OK);
    assert_eq!(quote.body["shipping_cost"], "65");
    assert_eq!(quote.body["total"], "665");

    let unknown = client
        .post("/checkout/quote", json!({ "region": "Atlantis" }))
        .await;
    assert_eq!(unknown.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_guest_checkout_end_to_end() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());
    client
        .post("/cart/add", json!({ "product_id": "r1", "quantity": 2 }))
        .await;
    client.post("/cart/add", json!({ "product_id": "r2" })).await;

    let placed = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;
    assert_eq!(placed.status, StatusCode::CREATED);
    assert_eq!(placed.body["provisioned_account"], true);
    let number = placed.body["order_number"].as_str().unwrap().to_string();
    assert!(number.starts_with("ORD-"));

    assert_eq!(client.get("/cart/count").await.body["count"], 0);

    // The provisioned guest is now the session's customer.
    let history = client.get("/account/orders").await;
    assert_eq!(history.status, StatusCode::OK);
    assert_eq!(history.body[0]["number"], number.as_str());
    assert_eq!(history.body[0]["status"], "pending");

    let tracked = client.get(&format!("/orders/{number}/track")).await;
    assert_eq!(tracked.status, StatusCode::OK);
    assert_eq!(tracked.body["tracker"]["steps"][0]["state"], "current");
    assert_eq!(tracked.body["order"]["line_items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_checkout_validation_errors() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());
    client.post("/cart/add", json!({ "product_id": "r1" })).await;

    let mut body = checkout_body("mona@example.com");
    body["phone"] = json!("12345");
    let rejected = client.post("/checkout", body).await;

    assert_eq!(rejected.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(rejected.body["fields"][0]["field"], "phone");
    assert_eq!(rejected.body["fields"].as_array().unwrap().len(), 1);
    assert_eq!(store.orders.count().await, 0);
    assert_eq!(store.customers.count().await, 0);
    assert_eq!(client.get("/cart/count").await.body["count"], 1);
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());

    let rejected = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_email_redirects_to_sign_in() {
    let store = TestStore::new();
    let app = store.app();

    let mut first = Client::new(&app);
    first.post("/cart/add", json!({ "product_id": "r1" })).await;
    let placed = first.post("/checkout", checkout_body("mona@example.com")).await;
    assert_eq!(placed.status, StatusCode::CREATED);

    let mut second = Client::new(&app);
    second.post("/cart/add", json!({ "product_id": "r2" })).await;
    let rejected = second
        .post("/checkout", checkout_body("mona@example.com"))
        .await;

    assert_eq!(rejected.status, StatusCode::CONFLICT);
    assert_eq!(rejected.body["redirect"], "/auth/login?email=mona%40example.com");
    assert_eq!(second.get("/cart/count").await.body["count"], 1);
}

#[tokio::test]
async fn test_malformed_idempotency_key_rejected() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());
    client.post("/cart/add", json!({ "product_id": "r1" })).await;

    let rejected = client
        .send(
            Method::POST,
            "/checkout",
            Some(checkout_body("mona@example.com")),
            &[("idempotency-key", "not-a-uuid")],
        )
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(store.orders.count().await, 0);
}

#[tokio::test]
async fn test_store_outage_keeps_cart_and_resubmission_places_one_order() {
    let mut flaky = None;
    let store = TestStore::with_order_store([souq_integration_tests::product("r1", 300)], |orders| {
        let front = Arc::new(FlakyOrders::new(orders));
        flaky = Some(front.clone());
        front as Arc<dyn OrderRepository>
    });
    let flaky = flaky.unwrap();
    let mut client = Client::new(&store.app());
    client
        .post("/cart/add", json!({ "product_id": "r1", "quantity": 2 }))
        .await;

    flaky.set_down(true);
    let failed = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;
    assert_eq!(failed.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(failed.body["retryable"], true);
    assert_eq!(client.get("/cart/count").await.body["count"], 2);
    assert_eq!(store.orders.count().await, 0);

    flaky.set_down(false);
    let placed = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;
    assert_eq!(placed.status, StatusCode::CREATED);
    assert_eq!(client.get("/cart/count").await.body["count"], 0);
    assert_eq!(store.orders.count().await, 1);
    assert_eq!(store.customers.count().await, 1);
}

#[tokio::test]
async fn test_lost_reply_is_answered_by_resubmitting_the_session_attempt() {
    let mut flaky = None;
    let store = TestStore::with_order_store([souq_integration_tests::product("r1", 300)], |orders| {
        let front = Arc::new(FlakyOrders::new(orders));
        flaky = Some(front.clone());
        front as Arc<dyn OrderRepository>
    });
    let flaky = flaky.unwrap();
    let mut client = Client::new(&store.app());
    client.post("/cart/add", json!({ "product_id": "r1" })).await;

    // The order is written but every reply is lost.
    flaky.set_lose_replies(true);
    let failed = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;
    assert_eq!(failed.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(failed.body["retryable"], true);
    assert_eq!(client.get("/cart/count").await.body["count"], 1);
    assert_eq!(store.orders.count().await, 1);

    flaky.set_lose_replies(false);
    let placed = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;
    assert_eq!(placed.status, StatusCode::CREATED);
    assert_eq!(store.orders.count().await, 1);
    assert_eq!(placed.body["totals"]["total"], "350");
}

#[tokio::test]
async fn test_reused_idempotency_key_with_changed_cart_is_rejected() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());
    let key = [("idempotency-key", "deadbeef-0000-4000-8000-000000000000")];

    client.post("/cart/add", json!({ "product_id": "r1" })).await;
    let placed = client
        .send(Method::POST, "/checkout", Some(checkout_body("mona@example.com")), &key)
        .await;
    assert_eq!(placed.status, StatusCode::CREATED);

    client
        .post("/cart/add", json!({ "product_id": "r2", "quantity": 3 }))
        .await;
    let rejected = client
        .send(Method::POST, "/checkout", Some(checkout_body("mona@example.com")), &key)
        .await;
    assert_eq!(rejected.status, StatusCode::CONFLICT);
    assert_eq!(rejected.body["order_number"], placed.body["order_number"]);
    assert!(rejected.body.get("retryable").is_none());
    assert_eq!(client.get("/cart/count").await.body["count"], 3);
    assert_eq!(store.orders.count().await, 1);
}

#[tokio::test]
async fn test_cart_change_starts_a_new_session_attempt() {
    let mut flaky = None;
    let store = TestStore::with_order_store(
        [
            souq_integration_tests::product("r1", 300),
            souq_integration_tests::product("r2", 200),
        ],
        |orders| {
            let front = Arc::new(FlakyOrders::new(orders));
            flaky = Some(front.clone());
            front as Arc<dyn OrderRepository>
        },
    );
    let flaky = flaky.unwrap();
    let mut client = Client::new(&store.app());
    client.post("/cart/add", json!({ "product_id": "r1" })).await;

    flaky.set_lose_replies(true);
    let failed = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;
    assert_eq!(failed.status, StatusCode::SERVICE_UNAVAILABLE);
    flaky.set_lose_replies(false);

    client.post("/cart/add", json!({ "product_id": "r2" })).await;
    let placed = client
        .post("/checkout", checkout_body("mona@example.com"))
        .await;

    assert_eq!(placed.status, StatusCode::CREATED);
    assert_eq!(placed.body["totals"]["subtotal"], "500");
    assert_eq!(store.orders.count().await, 2);
    assert_eq!(client.get("/cart/count").await.body["count"], 0);
}

// ============================================================================
// Auth and orders
// ============================================================================

#[tokio::test]
async fn test_guest_password_enables_sign_in() {
    let store = TestStore::new();
    let app = store.app();

    let mut guest = Client::new(&app);
    guest.post("/cart/add", json!({ "product_id": "r1" })).await;
    let mut body = checkout_body("mona@example.com");
    body["password"] = json!("correct horse");
    assert_eq!(guest.post("/checkout", body).await.status, StatusCode::CREATED);

    let mut returning = Client::new(&app);
    assert_eq!(
        returning.get("/account/orders").await.status,
        StatusCode::UNAUTHORIZED
    );

    let wrong = returning
        .post(
            "/auth/login",
            json!({ "email": "mona@example.com", "password": "wrong password" }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let signed_in = returning
        .post(
            "/auth/login",
            json!({ "email": "mona@example.com", "password": "correct horse" }),
        )
        .await;
    assert_eq!(signed_in.status, StatusCode::OK);
    assert_eq!(signed_in.body["email"], "mona@example.com");

    let history = returning.get("/account/orders").await;
    assert_eq!(history.status, StatusCode::OK);
    assert_eq!(history.body.as_array().unwrap().len(), 1);

    let out = returning.post("/auth/logout", json!({})).await;
    assert_eq!(out.status, StatusCode::NO_CONTENT);
    assert_eq!(
        returning.get("/account/orders").await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let store = TestStore::new();
    let mut client = Client::new(&store.app());

    let missing = client.get("/orders/ORD-00000000/track").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body, json!({ "error": "Order not found" }));

    let by_id = client.get("/orders/999/track").await;
    assert_eq!(by_id.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_ids_are_only_tracked_by_their_owner() {
    let store = TestStore::new();
    let app = store.app();

    let mut owner = Client::new(&app);
    owner.post("/cart/add", json!({ "product_id": "r1" })).await;
    let placed = owner.post("/checkout", checkout_body("mona@example.com")).await;
    assert_eq!(placed.status, StatusCode::CREATED);
    let id = placed.body["order_id"].as_i64().unwrap();
    let number = placed.body["order_number"].as_str().unwrap().to_string();

    let mut other = Client::new(&app);
    other.post("/cart/add", json!({ "product_id": "r2" })).await;
    let other_order = other.post("/checkout", checkout_body("salma@example.com")).await;
    assert_eq!(other_order.status, StatusCode::CREATED);

    let mut anonymous = Client::new(&app);
    let walked = anonymous.get(&format!("/orders/{id}/track")).await;
    assert_eq!(walked.status, StatusCode::NOT_FOUND);
    assert_eq!(walked.body, json!({ "error": "Order not found" }));
    assert_eq!(
        other.get(&format!("/orders/{id}/track")).await.status,
        StatusCode::NOT_FOUND
    );

    let own = owner.get(&format!("/orders/{id}/track")).await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["order"]["number"], number.as_str());

    let by_number = anonymous.get(&format!("/orders/{number}/track")).await;
    assert_eq!(by_number.status, StatusCode::OK);
}
