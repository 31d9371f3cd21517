use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tourbook_api::{app, middleware::Claims, AppState, AuthConfig};
use tourbook_booking::{
    BookingEngine, EngineParts, InMemoryBookingRepository, InMemoryPaymentRepository,
    NotificationDispatcher,
};
use tourbook_catalog::{InMemoryCatalog, Package};
use tourbook_core::gateway::{IntentStatus, MockPaymentGateway};
use tourbook_core::lock::LocalReconcileLock;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    gateway: Arc<MockPaymentGateway>,
    package: Package,
}

fn test_app() -> TestApp {
    let package = Package::new("Hunza Valley Tour", "hunza.jpg", 15000);
    let gateway = Arc::new(MockPaymentGateway::new());

    let engine = BookingEngine::new(EngineParts {
        bookings: Arc::new(InMemoryBookingRepository::new()),
        payments: Arc::new(InMemoryPaymentRepository::new()),
        catalog: Arc::new(InMemoryCatalog::with_packages([package.clone()])),
        gateway: gateway.clone(),
        lock: Arc::new(LocalReconcileLock::new()),
        notifier: NotificationDispatcher::disabled(),
        currency: "PKR".to_string(),
    });

    let state = AppState {
        engine,
        redis: None,
        auth: AuthConfig {
            secret: SECRET.to_string(),
        },
        request_timeout: std::time::Duration::from_secs(5),
        rate_limit_per_minute: 0,
    };

    TestApp {
        router: app(state),
        gateway,
        package,
    }
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        name: "Ayesha Khan".to_string(),
        email: "ayesha@example.com".to_string(),
        role: role.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn booking_body(&self, travelers: u32) -> Value {
        json!({
            "packageId": self.package.id,
            "travelDate": (Utc::now().date_naive() + Duration::days(14)).to_string(),
            "travelers": travelers,
            "customerPhone": "03001234567",
        })
    }

    /// Open a checkout as `user` and return (booking id, payment id, intent id).
    async fn checkout(&self, user: &str) -> (String, String, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/payments/create-payment-intent",
                Some(user),
                Some(self.booking_body(2)),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let booking_id = body["bookingId"].as_str().unwrap().to_string();
        let payment_id = body["paymentId"].as_str().unwrap().to_string();

        let (_, booking) = self
            .send(Method::GET, &format!("/api/bookings/{}", booking_id), Some(user), None)
            .await;
        let intent_id = booking["data"]["processor_intent_id"].as_str().unwrap().to_string();
        (booking_id, payment_id, intent_id)
    }
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = test_app();
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_rejected() {
    let app = test_app();

    let (status, body) = app.send(Method::GET, "/api/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app.send(Method::GET, "/api/payments", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_list_bookings() {
    let app = test_app();
    let user = token("user-1", "user");

    let (status, body) = app
        .send(Method::POST, "/api/bookings", Some(&user), Some(app.booking_body(2)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["payment_status"], "unpaid");
    assert_eq!(body["data"]["total_amount"], 30000);
    // Contact details fall back to the token claims
    assert_eq!(body["data"]["customer"]["email"], "ayesha@example.com");

    let (status, body) = app.send(Method::GET, "/api/bookings", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let other = token("user-2", "user");
    let (_, body) = app.send(Method::GET, "/api/bookings", Some(&other), None).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_booking_validation_errors() {
    let app = test_app();
    let user = token("user-1", "user");

    let (status, body) = app
        .send(Method::POST, "/api/bookings", Some(&user), Some(app.booking_body(0)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let mut unknown = app.booking_body(2);
    unknown["packageId"] = json!(uuid::Uuid::new_v4());
    let (status, _) = app.send(Method::POST, "/api/bookings", Some(&user), Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_users_booking_is_forbidden() {
    let app = test_app();
    let owner = token("user-1", "user");
    let (_, created) = app
        .send(Method::POST, "/api/bookings", Some(&owner), Some(app.booking_body(1)))
        .await;
    let uri = format!("/api/bookings/{}", created["data"]["id"].as_str().unwrap());

    let (status, _) = app.send(Method::GET, &uri, Some(&token("user-2", "user")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, &uri, Some(&token("ops", "admin")), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_then_confirm() {
    let app = test_app();
    let user = token("user-1", "user");
    let (booking_id, _, intent_id) = app.checkout(&user).await;

    let (_, booking) = app
        .send(Method::GET, &format!("/api/bookings/{}", booking_id), Some(&user), None)
        .await;
    assert_eq!(booking["data"]["status"], "pending");
    assert_eq!(booking["data"]["payment_status"], "pending");

    let confirm = json!({ "paymentIntentId": intent_id, "bookingId": booking_id });

    let (status, body) = app
        .send(Method::POST, "/api/payments/confirm", Some(&user), Some(confirm.clone()))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);

    app.gateway.set_intent_status(&intent_id, IntentStatus::Succeeded);

    let (status, body) = app
        .send(Method::POST, "/api/payments/confirm", Some(&user), Some(confirm.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "confirmed");
    assert_eq!(body["booking"]["payment_status"], "paid");
    assert_eq!(body["payment"]["status"], "succeeded");
    let transaction_id = body["payment"]["transaction_id"].clone();
    assert!(transaction_id.is_string());

    let (status, again) = app
        .send(Method::POST, "/api/payments/confirm", Some(&user), Some(confirm))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["payment"]["transaction_id"], transaction_id);
    assert_eq!(again["booking"]["status"], "confirmed");
}

#[tokio::test]
async fn test_confirm_requires_both_ids() {
    let app = test_app();
    let user = token("user-1", "user");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/payments/confirm",
            Some(&user),
            Some(json!({ "paymentIntentId": "pi_1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Payment intent ID and booking ID are required");
}

#[tokio::test]
async fn test_admin_routes_reject_plain_users() {
    let app = test_app();
    let user = token("user-1", "user");
    app.send(Method::POST, "/api/bookings", Some(&user), Some(app.booking_body(1)))
        .await;

    for uri in ["/api/bookings/admin/all", "/api/payments/admin/all", "/api/payments/stripe/transactions"] {
        let (status, _) = app.send(Method::GET, uri, Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
    }

    let admin = token("ops", "admin");
    let (status, body) = app
        .send(Method::GET, "/api/bookings/admin/all?page=1&limit=10", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["pagination"]["totalPages"], 1);
}

#[tokio::test]
async fn test_admin_payment_status_override() {
    let app = test_app();
    let user = token("user-1", "user");
    let admin = token("ops", "admin");
    let (_, payment_id, _) = app.checkout(&user).await;
    let uri = format!("/api/payments/{}", payment_id);

    let (status, _) = app
        .send(Method::PUT, &uri, Some(&user), Some(json!({ "status": "failed" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "bogus" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "succeeded" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "succeeded");
    assert_eq!(body["booking"]["status"], "confirmed");
    assert_eq!(body["booking"]["payment_status"], "paid");

    // The owner can still read their payment
    let (status, _) = app.send(Method::GET, &uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_cannot_confirm_unpaid_booking() {
    let app = test_app();
    let user = token("user-1", "user");
    let (_, created) = app
        .send(Method::POST, "/api/bookings", Some(&user), Some(app.booking_body(1)))
        .await;
    let uri = format!("/api/bookings/{}", created["data"]["id"].as_str().unwrap());
    let admin = token("ops", "admin");

    let (status, _) = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "confirmed" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::PUT, &uri, Some(&admin), Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_with_pending_payment_flags_refund() {
    let app = test_app();
    let user = token("user-1", "user");
    let (booking_id, payment_id, _) = app.checkout(&user).await;

    let (status, body) = app
        .send(Method::PUT, &format!("/api/bookings/{}/cancel", booking_id), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["payment_status"], "refund_pending");
    assert!(body["message"].as_str().unwrap().contains("refund"));

    let (_, payment) = app
        .send(Method::GET, &format!("/api/payments/{}", payment_id), Some(&user), None)
        .await;
    assert_eq!(payment["data"]["status"], "cancellation_pending");

    let (status, _) = app
        .send(Method::PUT, &format!("/api/bookings/{}/cancel", booking_id), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_resync_reports() {
    let app = test_app();
    let user = token("user-1", "user");
    app.checkout(&user).await;

    let admin = token("ops", "admin");
    let (status, body) = app
        .send(Method::POST, "/api/payments/admin/resync", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scanned"], 1);
    assert_eq!(body["data"]["corrected"], 0);
    assert_eq!(body["data"]["orphaned"], json!([]));
}

#[tokio::test]
async fn test_transaction_details_link_local_records() {
    let app = test_app();
    let user = token("user-1", "user");
    let (booking_id, payment_id, intent_id) = app.checkout(&user).await;
    app.gateway.set_intent_status(&intent_id, IntentStatus::Succeeded);

    let (_, confirmed) = app
        .send(
            Method::POST,
            "/api/payments/confirm",
            Some(&user),
            Some(json!({ "paymentIntentId": intent_id, "bookingId": booking_id })),
        )
        .await;
    let charge_id = confirmed["payment"]["processor_charge_id"].as_str().unwrap().to_string();

    let admin = token("ops", "admin");
    let (status, list) = app
        .send(Method::GET, "/api/payments/stripe/transactions?limit=500", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);
    assert_eq!(list["pagination"]["limit"], 100);

    let (status, detail) = app
        .send(
            Method::GET,
            &format!("/api/payments/stripe/transactions/{}", charge_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let details = &detail["data"]["enhanced_billing_details"];
    assert_eq!(details["payment_id"], payment_id);
    assert_eq!(details["booking_id"], booking_id);
    assert_eq!(details["booking_status"], "confirmed");
    assert_eq!(details["amount"], 30000);

    let (status, _) = app
        .send(Method::GET, "/api/payments/stripe/transactions/ch_missing", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stripe_balance_is_admin_only() {
    let app = test_app();
    let user = token("user-1", "user");
    let (booking_id, _, intent_id) = app.checkout(&user).await;
    app.gateway.set_intent_status(&intent_id, IntentStatus::Succeeded);
    app.send(
        Method::POST,
        "/api/payments/confirm",
        Some(&user),
        Some(json!({ "paymentIntentId": intent_id, "bookingId": booking_id })),
    )
    .await;

    let (status, _) = app.send(Method::GET, "/api/payments/stripe/balance", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token("ops", "admin");
    let (status, body) = app.send(Method::GET, "/api/payments/stripe/balance", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["balance"]["available"][0]["amount"], 3_000_000);
    assert_eq!(body["balance"]["available"][0]["currency"], "pkr");

    app.gateway.set_unavailable(true);
    let (status, body) = app.send(Method::GET, "/api/payments/stripe/balance", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_confirm_replay_after_refund_keeps_booking_cancelled() {
    let app = test_app();
    let user = token("user-1", "user");
    let admin = token("ops", "admin");
    let (booking_id, payment_id, intent_id) = app.checkout(&user).await;
    app.gateway.set_intent_status(&intent_id, IntentStatus::Succeeded);
    let confirm = json!({ "paymentIntentId": intent_id, "bookingId": booking_id });

    app.send(Method::POST, "/api/payments/confirm", Some(&user), Some(confirm.clone()))
        .await;
    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/payments/{}", payment_id),
            Some(&admin),
            Some(json!({ "status": "refunded" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::POST, "/api/payments/confirm", Some(&user), Some(confirm))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["status"], "refunded");
    assert_eq!(body["booking"]["status"], "cancelled");
    assert_eq!(body["booking"]["payment_status"], "refunded");
}
