use actix_web::{http::StatusCode, test, test::TestRequest, App};
use paygate_engine::OrderStore;
use paygate_providers::{MOBILE_MONEY_SIGNATURE_HEADER, PREPAID_SIGNATURE_HEADER};
use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock,
    ResponseTemplate,
};

use super::helpers::{send, sign_momo, sign_prepaid, TestContext};
use crate::auth::USER_ID_HEADER;

#[actix_web::test]
async fn collection_webhook_with_bad_signature_is_rejected() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path("/deposits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "depositId": "dep-9", "status": "ACCEPTED" })))
        .mount(&ctx.momo_server)
        .await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = TestRequest::post()
        .uri("/api/cart/items")
        .insert_header((USER_ID_HEADER, "frank"))
        .set_json(json!({"currency": "GHS", "product_id": "soap", "name": "Soap", "unit_price": 1250, "quantity": 1}))
        .to_request();
    send(&app, req).await;
    let req = TestRequest::post()
        .uri("/api/checkout/mobile_money")
        .insert_header((USER_ID_HEADER, "frank"))
        .set_json(json!({ "phone": "0241234567" }))
        .to_request();
    let (status, checkout) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    // No conversion when the cart is already in the collection currency
    assert_eq!(checkout["amount"], 1250);
    let reference = checkout["sessionId"].as_str().expect("session id").to_string();

    let callback = json!({
        "depositId": reference, "status": "COMPLETED", "depositedAmount": "12.50", "currency": "GHS"
    })
    .to_string();
    let forged = sign_momo(&callback.replace("12.50", "0.01"));
    let req = TestRequest::post()
        .uri("/webhook/collection/mobile_money")
        .insert_header((MOBILE_MONEY_SIGNATURE_HEADER, forged))
        .set_payload(callback.clone())
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let req = TestRequest::post().uri("/webhook/collection/mobile_money").set_payload(callback).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(ctx.db.fetch_order_by_reference(&reference.as_str().into()).await.unwrap().is_none());
    let req = TestRequest::post()
        .uri("/api/payments/verify")
        .insert_header((USER_ID_HEADER, "frank"))
        .set_json(json!({ "paymentReference": reference }))
        .to_request();
    let (_, body) = send(&app, req).await;
    assert_eq!(body["status"], "pending");
}

#[actix_web::test]
async fn late_payment_is_orphaned() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let callback = json!({
        "depositId": "ORD-expired-session", "status": "COMPLETED", "depositedAmount": "50.00", "currency": "GHS"
    })
    .to_string();
    let req = TestRequest::post()
        .uri("/webhook/collection/mobile_money")
        .insert_header((MOBILE_MONEY_SIGNATURE_HEADER, sign_momo(&callback)))
        .set_payload(callback)
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let orphans = ctx.db.fetch_orphaned_payments(&"ORD-expired-session".into()).await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].payment_reference.as_str(), "ORD-expired-session");
}

#[actix_web::test]
async fn unknown_collection_method() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = TestRequest::post().uri("/webhook/collection/paypal").set_payload("{}").to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn fulfillment_webhooks() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let event = json!({
        "type": "airtime_transaction.status",
        "data": { "transactionId": 4242, "status": "SUCCESSFUL" }
    })
    .to_string();

    let req = TestRequest::post()
        .uri("/webhook/fulfillment")
        .insert_header((PREPAID_SIGNATURE_HEADER, "deadbeef"))
        .set_payload(event.clone())
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Updates for transactions we never created are acknowledged and ignored
    let req = TestRequest::post()
        .uri("/webhook/fulfillment")
        .insert_header((PREPAID_SIGNATURE_HEADER, sign_prepaid(&event)))
        .set_payload(event)
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[actix_web::test]
async fn fulfillment_requires_a_paid_order_owned_by_the_caller() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = TestRequest::post()
        .uri("/api/fulfillment")
        .insert_header((USER_ID_HEADER, "grace"))
        .set_json(json!({ "orderReference": "TOP-unknown", "recipient": "0241234567" }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = TestRequest::post().uri("/api/fulfillment").set_json(json!({ "orderReference": "TOP-x" })).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
