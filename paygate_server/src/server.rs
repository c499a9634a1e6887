use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use paygate_engine::{
    db_types::PaymentMethod,
    events::EventProducers,
    helpers::RetryPolicy,
    traits::{CollectionProviders, OrderStore},
    CartApi,
    CheckoutApi,
    ExchangeRateApi,
    FulfillmentApi,
    MemoryCartStore,
    MemorySessionStore,
    OrderFlowApi,
    SqliteDatabase,
};
use paygate_providers::{CardProvider, CollectionAdapter, MobileMoneyProvider, PrepaidProvider};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{
        fulfillment::{create_fulfillment_event_handlers, PrepaidFulfillmentApi},
        notifications::create_notification_event_handlers,
    },
    reconciliation_worker::start_reconciliation_worker,
    routes::{
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
    },
};

/// Everything the request handlers share across workers.
#[derive(Clone)]
pub struct ServerState {
    pub db: SqliteDatabase,
    pub carts: MemoryCartStore,
    pub sessions: MemorySessionStore,
    pub collection: CollectionProviders<CollectionAdapter>,
    pub fulfillment: Arc<PrepaidFulfillmentApi>,
    pub producers: EventProducers,
    pub retry: RetryPolicy,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🗃️ Database ready at {}", db.url());
    seed_exchange_rates(&config, &db).await?;

    let retry = RetryPolicy::default()
        .with_max_attempts(config.retry_attempts)
        .with_attempt_timeout(config.provider_timeout);
    let collection = collection_providers(&config)?;
    let prepaid = PrepaidProvider::new(config.prepaid.clone(), config.provider_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.prepaid.client_id.is_empty() {
        warn!("🪛️ PAYGATE_PREPAID_CLIENT_ID is not set. Airtime and gift card orders cannot be fulfilled.");
    }

    // Completed and failed orders are reported by both the order flow and fulfillment APIs.
    let notifications = create_notification_event_handlers();
    let mut producers = notifications.producers();
    let fulfillment =
        Arc::new(FulfillmentApi::new(db.clone(), prepaid, producers.clone()).with_retry_policy(retry.clone()));
    // Only the order flow API publishes OrderPaid, and those events drive automatic fulfillment.
    let dispatcher = create_fulfillment_event_handlers(Arc::clone(&fulfillment));
    producers.order_paid_producer.extend(dispatcher.producers().order_paid_producer);
    notifications.start_handlers().await;
    dispatcher.start_handlers().await;

    let _worker = start_reconciliation_worker(
        Arc::clone(&fulfillment),
        config.reconcile_interval,
        config.stale_fulfillment_timeout,
    );

    let mut db_handle = db.clone();
    let state = ServerState {
        db,
        carts: MemoryCartStore::new(config.max_carts),
        sessions: MemorySessionStore::default(),
        collection,
        fulfillment,
        producers,
        retry,
    };
    let srv = create_server_instance(config, state)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    info!("🗃️ Server stopped. Closing database connections");
    if let Err(e) = db_handle.close().await {
        warn!("🗃️ Could not close the database cleanly. {e}");
    }
    result
}

pub fn create_server_instance(config: ServerConfig, state: ServerState) -> Result<Server, ServerError> {
    let session_ttl = config.session_ttl;
    let grace_period = config.verify_grace_period;
    let srv = HttpServer::new(move || {
        let ServerState { db, carts, sessions, collection, fulfillment, producers, retry } = state.clone();
        let cart_api = CartApi::new(carts.clone());
        let checkout_api = CheckoutApi::new(carts.clone(), sessions.clone(), db.clone(), collection.clone())
            .with_retry_policy(retry.clone())
            .with_session_ttl(session_ttl);
        let orders_api = OrderFlowApi::new(db, carts, sessions, collection, producers)
            .with_retry_policy(retry)
            .with_verify_grace_period(grace_period);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("paygate::access_log"))
            .app_data(web::Data::new(cart_api))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::from(fulfillment));
        let api_scope = web::scope("/api")
            .service(GetCartRoute::<MemoryCartStore>::new())
            .service(ReplaceCartRoute::<MemoryCartStore>::new())
            .service(AddCartItemRoute::<MemoryCartStore>::new())
            .service(UpdateCartItemRoute::<MemoryCartStore>::new())
            .service(ClearCartRoute::<MemoryCartStore>::new())
            .service(
                CheckoutRoute::<MemoryCartStore, MemorySessionStore, SqliteDatabase, CollectionAdapter>::new(),
            )
            .service(
                VerifyPaymentRoute::<SqliteDatabase, MemoryCartStore, MemorySessionStore, CollectionAdapter>::new(),
            )
            .service(OrderDetailsRoute::<SqliteDatabase, MemoryCartStore, MemorySessionStore, CollectionAdapter>::new())
            .service(FulfilOrderRoute::<SqliteDatabase, PrepaidProvider>::new());
        let webhook_scope = web::scope("/webhook")
            .service(
                CollectionWebhookRoute::<SqliteDatabase, MemoryCartStore, MemorySessionStore, CollectionAdapter>::new(),
            )
            .service(FulfillmentWebhookRoute::<SqliteDatabase, PrepaidProvider>::new());
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Builds the collection providers that have credentials configured. Methods without credentials are unavailable,
/// and checkouts that request them fail with `UnsupportedPaymentMethod`.
fn collection_providers(config: &ServerConfig) -> Result<CollectionProviders<CollectionAdapter>, ServerError> {
    let mut providers = CollectionProviders::new();
    if config.mobile_money.api_token.is_empty() {
        warn!("🪛️ PAYGATE_MOMO_API_TOKEN is not set. Mobile money payments are disabled.");
    } else {
        let momo = MobileMoneyProvider::new(config.mobile_money.clone(), config.provider_timeout)
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        info!("🪛️ Mobile money payments are enabled, collecting in {}", config.mobile_money.currency);
        providers = providers.with_provider(PaymentMethod::MobileMoney, CollectionAdapter::from(momo));
    }
    if config.card.secret_key.is_empty() {
        warn!("🪛️ PAYGATE_CARD_SECRET_KEY is not set. Card payments are disabled.");
    } else {
        let card = CardProvider::new(config.card.clone(), config.provider_timeout)
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        info!("🪛️ Card payments are enabled, collecting in {}", config.card.currency);
        providers = providers.with_provider(PaymentMethod::Card, CollectionAdapter::from(card));
    }
    if providers.methods().next().is_none() {
        return Err(ServerError::ConfigurationError("No collection provider is configured".to_string()));
    }
    Ok(providers)
}

async fn seed_exchange_rates(config: &ServerConfig, db: &SqliteDatabase) -> Result<(), ServerError> {
    let api = ExchangeRateApi::new(db.clone());
    for rate in &config.exchange_rates {
        api.set_exchange_rate(rate).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
        info!("🪛️ Exchange rate set: {rate}");
    }
    Ok(())
}
