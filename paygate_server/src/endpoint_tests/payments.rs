use actix_web::{http::StatusCode, test, test::TestRequest, App};
use paygate_engine::{db_types::OrderStatusType, OrderStore};
use paygate_providers::MOBILE_MONEY_SIGNATURE_HEADER;
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock,
    ResponseTemplate,
};

use super::helpers::{send, sign_momo, TestContext};
use crate::auth::USER_ID_HEADER;

async fn accept_deposits(ctx: &TestContext) {
    Mock::given(method("POST"))
        .and(path("/deposits"))
        .and(body_partial_json(json!({ "currency": "GHS", "correspondent": "MTN_MOMO_GHA" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "depositId": "dep-1", "status": "ACCEPTED" })))
        .mount(&ctx.momo_server)
        .await;
}

fn add_mug(user: &str) -> TestRequest {
    TestRequest::post()
        .uri("/api/cart/items")
        .insert_header((USER_ID_HEADER, user))
        .set_json(json!({"currency": "USD", "product_id": "mug", "name": "Mug", "unit_price": 999, "quantity": 2}))
}

fn momo_callback(reference: &str, status: &str, amount: &str) -> String {
    json!({
        "depositId": reference,
        "status": status,
        "requestedAmount": amount,
        "depositedAmount": amount,
        "currency": "GHS",
        "providerTransactionId": "MTN-778899"
    })
    .to_string()
}

#[actix_web::test]
async fn checkout_webhook_and_poll() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    accept_deposits(&ctx).await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let (status, _) = send(&app, add_mug("alice").to_request()).await;
    assert_eq!(status, StatusCode::OK);

    let req = TestRequest::post()
        .uri("/api/checkout/momo")
        .insert_header((USER_ID_HEADER, "alice"))
        .set_json(json!({ "phone": "024 123 4567", "network": "MTN" }))
        .to_request();
    let (status, checkout) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{checkout}");
    // 2 x $9.99 at 15.5 GHS/USD
    assert_eq!(checkout["amount"], 30969);
    assert_eq!(checkout["currency"], "GHS");
    let reference = checkout["sessionId"].as_str().expect("session id").to_string();

    // Mobile money is confirmed by callback only, so the poll waits
    let req = TestRequest::post()
        .uri("/api/payments/verify")
        .insert_header((USER_ID_HEADER, "alice"))
        .set_json(json!({ "paymentReference": reference }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "pending");

    let callback = momo_callback(&reference, "COMPLETED", "309.69");
    let req = TestRequest::post()
        .uri("/webhook/collection/mobile_money")
        .insert_header((MOBILE_MONEY_SIGNATURE_HEADER, sign_momo(&callback)))
        .set_payload(callback.clone())
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    // Redelivery is acknowledged and changes nothing
    let req = TestRequest::post()
        .uri("/webhook/collection/mobile_money")
        .insert_header((MOBILE_MONEY_SIGNATURE_HEADER, sign_momo(&callback)))
        .set_payload(callback)
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = TestRequest::post()
        .uri("/api/payments/verify")
        .insert_header((USER_ID_HEADER, "alice"))
        .set_json(json!({ "paymentReference": reference }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "paid");
    let order_id = body["orderId"].as_i64().expect("order id");

    let order = ctx.db.fetch_order_by_reference(&reference.as_str().into()).await.unwrap().expect("order");
    assert_eq!(order.id, order_id);
    assert_eq!(order.status, OrderStatusType::Paid);
    assert_eq!(order.amount.value(), 30969);
    assert_eq!(order.transaction_id.as_deref(), Some("MTN-778899"));

    // The cart is consumed by the paid order
    let req = TestRequest::get().uri("/api/cart").insert_header((USER_ID_HEADER, "alice")).to_request();
    let (_, cart) = send(&app, req).await;
    assert_eq!(cart["items"], json!([]));

    let req = TestRequest::get()
        .uri(&format!("/api/orders/{reference}"))
        .insert_header((USER_ID_HEADER, "alice"))
        .to_request();
    let (status, details) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["status"], "paid");
    assert_eq!(details["items"][0]["product_id"], "mug");
    assert_eq!(details["items"][0]["quantity"], 2);
    assert_eq!(details["fulfillment"], Value::Null);

    // Orders are only visible to their owner
    let req = TestRequest::get()
        .uri(&format!("/api/orders/{reference}"))
        .insert_header((USER_ID_HEADER, "mallory"))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn declined_payment_keeps_cart() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    accept_deposits(&ctx).await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    send(&app, add_mug("dave").to_request()).await;
    let req = TestRequest::post()
        .uri("/api/checkout/mobile_money")
        .insert_header((USER_ID_HEADER, "dave"))
        .set_json(json!({ "phone": "0241234567" }))
        .to_request();
    let (status, checkout) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let reference = checkout["sessionId"].as_str().expect("session id").to_string();

    let callback = json!({
        "depositId": reference,
        "status": "FAILED",
        "currency": "GHS",
        "failureReason": { "failureCode": "PAYER_LIMIT_REACHED", "failureMessage": "Daily limit exceeded" }
    })
    .to_string();
    let req = TestRequest::post()
        .uri("/webhook/collection/momo")
        .insert_header((MOBILE_MONEY_SIGNATURE_HEADER, sign_momo(&callback)))
        .set_payload(callback)
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let req = TestRequest::get().uri("/api/cart").insert_header((USER_ID_HEADER, "dave")).to_request();
    let (_, cart) = send(&app, req).await;
    assert_eq!(cart["items"][0]["product_id"], "mug");
    assert!(ctx.db.fetch_order_by_reference(&reference.as_str().into()).await.unwrap().is_none());
}

#[actix_web::test]
async fn checkout_errors() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    accept_deposits(&ctx).await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;

    let req = TestRequest::post()
        .uri("/api/checkout/bitcoin")
        .insert_header((USER_ID_HEADER, "erin"))
        .set_json(json!({}))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Card payments are not configured on this server
    let req = TestRequest::post()
        .uri("/api/checkout/card")
        .insert_header((USER_ID_HEADER, "erin"))
        .set_json(json!({ "email": "erin@example.com" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post()
        .uri("/api/checkout/mobile_money")
        .insert_header((USER_ID_HEADER, "erin"))
        .set_json(json!({ "phone": "0241234567" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    send(&app, add_mug("erin").to_request()).await;
    let req = TestRequest::post()
        .uri("/api/checkout/mobile_money")
        .insert_header((USER_ID_HEADER, "erin"))
        .set_json(json!({ "phone": "0311234567" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = TestRequest::post()
        .uri("/api/payments/verify")
        .insert_header((USER_ID_HEADER, "erin"))
        .set_json(json!({ "paymentReference": "ORD-doesnotexist" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::GONE);
}
