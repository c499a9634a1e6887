use actix_web::{http::StatusCode, test, test::TestRequest, App};
use serde_json::{json, Value};

use super::helpers::{send, TestContext};
use crate::auth::USER_ID_HEADER;

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let res = test::call_service(&app, TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(test::read_body(res).await, "👍️\n");
}

#[actix_web::test]
async fn cart_requires_user_id() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let (status, body) = send(&app, TestRequest::get().uri("/api/cart").to_request()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "The request did not identify a user");

    let req = TestRequest::get().uri("/api/cart").insert_header((USER_ID_HEADER, "  ")).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn add_update_and_clear_cart() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;

    let req = TestRequest::get().uri("/api/cart").insert_header((USER_ID_HEADER, "alice")).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([]));

    for _ in 0..2 {
        let req = TestRequest::post()
            .uri("/api/cart/items")
            .insert_header((USER_ID_HEADER, "alice"))
            .set_json(json!({"currency": "USD", "product_id": "mug", "name": "Mug", "unit_price": 999, "quantity": 1}))
            .to_request();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }
    let req = TestRequest::post()
        .uri("/api/cart/items")
        .insert_header((USER_ID_HEADER, "alice"))
        .set_json(json!({"currency": "USD", "product_id": "hat", "name": "Hat", "unit_price": 1500, "quantity": 1}))
        .to_request();
    let (_, cart) = send(&app, req).await;
    let items = cart["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_id"], "mug");
    assert_eq!(items[0]["quantity"], 2);

    // Setting a quantity of zero removes the line
    let req = TestRequest::patch()
        .uri("/api/cart/items/hat")
        .insert_header((USER_ID_HEADER, "alice"))
        .set_json(json!({"quantity": 0}))
        .to_request();
    let (status, cart) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(1));

    // Other users' carts are untouched
    let req = TestRequest::get().uri("/api/cart").insert_header((USER_ID_HEADER, "bob")).to_request();
    let (_, body) = send(&app, req).await;
    assert_eq!(body["items"], json!([]));

    let req = TestRequest::delete().uri("/api/cart").insert_header((USER_ID_HEADER, "alice")).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], Value::Bool(true));
    let req = TestRequest::get().uri("/api/cart").insert_header((USER_ID_HEADER, "alice")).to_request();
    let (_, body) = send(&app, req).await;
    assert_eq!(body["items"], json!([]));
}

#[actix_web::test]
async fn replace_cart() {
    let _ = env_logger::try_init();
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = TestRequest::put()
        .uri("/api/cart")
        .insert_header((USER_ID_HEADER, "carol"))
        .set_json(json!({
            "currency": "GHS",
            "items": [
                {"product_id": "airtime-10", "name": "Airtime", "unit_price": 1000, "quantity": 1, "product_type": "airtime"}
            ]
        }))
        .to_request();
    let (status, cart) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["currency"], "GHS");
    assert_eq!(cart["items"][0]["product_type"], "airtime");

    let req = TestRequest::put()
        .uri("/api/cart")
        .insert_header((USER_ID_HEADER, "carol"))
        .set_json(json!({"currency": "cedi", "items": []}))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
