use std::{sync::Arc, time::Duration};

use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
    web,
    web::ServiceConfig,
};
use paygate_common::Secret;
use paygate_engine::{
    db_types::PaymentMethod,
    events::EventProducers,
    helpers::RetryPolicy,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::CollectionProviders,
    CartApi,
    CheckoutApi,
    FulfillmentApi,
    MemoryCartStore,
    MemorySessionStore,
    OrderFlowApi,
    SqliteDatabase,
};
use paygate_providers::{
    CollectionAdapter,
    HmacAlgorithm,
    HmacVerifier,
    MobileMoneyConfig,
    MobileMoneyProvider,
    PrepaidConfig,
    PrepaidProvider,
    SignatureEncoding,
};
use serde_json::Value;
use wiremock::MockServer;

use super::mocks::{usd_ghs_rates, MockRateSource};
use crate::routes::{
    health,
    AddCartItemRoute,
    CheckoutRoute,
    ClearCartRoute,
    CollectionWebhookRoute,
    FulfilOrderRoute,
    FulfillmentWebhookRoute,
    GetCartRoute,
    OrderDetailsRoute,
    ReplaceCartRoute,
    UpdateCartItemRoute,
    VerifyPaymentRoute,
};

pub const MOMO_WEBHOOK_SECRET: &str = "momo-webhook-secret";
pub const PREPAID_WEBHOOK_SECRET: &str = "prepaid-webhook-secret";

/// The backends behind one test server. The stores are shared with the handlers, so tests can inspect them.
pub struct TestContext {
    pub db: SqliteDatabase,
    pub carts: MemoryCartStore,
    pub sessions: MemorySessionStore,
    pub momo_server: MockServer,
}

impl TestContext {
    pub async fn new() -> Self {
        let db = prepare_test_env(&random_db_path()).await;
        let momo_server = MockServer::start().await;
        Self { db, carts: MemoryCartStore::default(), sessions: MemorySessionStore::default(), momo_server }
    }

    pub fn configure(&self) -> impl FnOnce(&mut ServiceConfig) {
        let momo_config = MobileMoneyConfig {
            base_url: self.momo_server.uri(),
            api_token: Secret::new("momo-token".into()),
            webhook_secret: Secret::new(MOMO_WEBHOOK_SECRET.into()),
            currency: "GHS".into(),
            country: "GHA".into(),
        };
        let momo = MobileMoneyProvider::new(momo_config, Duration::from_secs(2)).expect("mobile money provider");
        let providers = CollectionProviders::new().with_provider(PaymentMethod::MobileMoney, CollectionAdapter::from(momo));
        let prepaid_config = PrepaidConfig {
            auth_url: "http://127.0.0.1:9/token".into(),
            topup_url: "http://127.0.0.1:9".into(),
            giftcard_url: "http://127.0.0.1:9".into(),
            webhook_secret: Secret::new(PREPAID_WEBHOOK_SECRET.into()),
            country_code: "GH".into(),
            ..Default::default()
        };
        let prepaid = PrepaidProvider::new(prepaid_config, Duration::from_secs(2)).expect("prepaid provider");
        // One attempt, no back-off, so that failure paths are quick
        let retry = RetryPolicy::default().with_max_attempts(1);

        let cart_api = CartApi::new(self.carts.clone());
        let checkout_api: CheckoutApi<_, _, MockRateSource, _> =
            CheckoutApi::new(self.carts.clone(), self.sessions.clone(), usd_ghs_rates(), providers.clone())
                .with_retry_policy(retry.clone());
        let orders_api = OrderFlowApi::new(
            self.db.clone(),
            self.carts.clone(),
            self.sessions.clone(),
            providers,
            EventProducers::default(),
        )
        .with_retry_policy(retry.clone())
        .with_verify_grace_period(Duration::ZERO);
        let fulfillment_api =
            Arc::new(FulfillmentApi::new(self.db.clone(), prepaid, EventProducers::default()).with_retry_policy(retry));
        move |cfg: &mut ServiceConfig| {
            cfg.app_data(web::Data::new(cart_api))
                .app_data(web::Data::new(checkout_api))
                .app_data(web::Data::new(orders_api))
                .app_data(web::Data::from(fulfillment_api))
                .service(health)
                .service(
                    web::scope("/api")
                        .service(GetCartRoute::<MemoryCartStore>::new())
                        .service(ReplaceCartRoute::<MemoryCartStore>::new())
                        .service(AddCartItemRoute::<MemoryCartStore>::new())
                        .service(UpdateCartItemRoute::<MemoryCartStore>::new())
                        .service(ClearCartRoute::<MemoryCartStore>::new())
                        .service(
                            CheckoutRoute::<MemoryCartStore, MemorySessionStore, MockRateSource, CollectionAdapter>::new(),
                        )
                        .service(
                            VerifyPaymentRoute::<SqliteDatabase, MemoryCartStore, MemorySessionStore, CollectionAdapter>::new(),
                        )
                        .service(
                            OrderDetailsRoute::<SqliteDatabase, MemoryCartStore, MemorySessionStore, CollectionAdapter>::new(),
                        )
                        .service(FulfilOrderRoute::<SqliteDatabase, PrepaidProvider>::new()),
                )
                .service(
                    web::scope("/webhook")
                        .service(
                            CollectionWebhookRoute::<SqliteDatabase, MemoryCartStore, MemorySessionStore, CollectionAdapter>::new(),
                        )
                        .service(FulfillmentWebhookRoute::<SqliteDatabase, PrepaidProvider>::new()),
                );
        }
    }
}

pub fn sign_momo(body: &str) -> String {
    HmacVerifier::new(Secret::new(MOMO_WEBHOOK_SECRET.into()), HmacAlgorithm::Sha256, SignatureEncoding::Base64)
        .sign(body.as_bytes())
}

pub fn sign_prepaid(body: &str) -> String {
    HmacVerifier::new(Secret::new(PREPAID_WEBHOOK_SECRET.into()), HmacAlgorithm::Sha256, SignatureEncoding::Hex)
        .sign(body.as_bytes())
}

/// Sends the request and returns the status with the body parsed as JSON (`Value::Null` if the body is not JSON).
pub async fn send<S, R, B, E>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = E>,
    B: MessageBody,
    E: std::fmt::Debug,
{
    let res = test::call_service(app, req).await;
    let status = res.status();
    let body = test::read_body(res).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
