//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Provider calls, database queries and the like must be awaited,
//! never blocked on.
//!
//! Customer routes identify the caller with the [`UserId`] extractor. Webhook routes are unauthenticated at the HTTP
//! level; the engine checks each body's signature before acting on it.
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use paygate_engine::{
    db_types::{Cart, PaymentMethod, PaymentReference},
    order_objects::{CheckoutRequest, FulfillmentCommand},
    traits::{CartStore, CollectionProvider, ExchangeRates, FulfillmentProvider, PaymentSessionStore},
    CartApi,
    CheckoutApi,
    FulfillmentApi,
    OrderFlowApi,
    OrderStore,
};

use crate::{
    auth::UserId,
    data_objects::{
        AddCartItemRequest,
        FulfillmentResponse,
        JsonResponse,
        ReplaceCartRequest,
        UpdateQuantityRequest,
        VerifyPaymentRequest,
        VerifyPaymentResponse,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Cart  ----------------------------------------------------
route!(get_cart => Get "/cart" impl CartStore);
/// Returns the caller's cart. Users without a cart get an empty list of items.
pub async fn get_cart<C: CartStore>(user: UserId, api: web::Data<CartApi<C>>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET cart for {}", user.as_str());
    match api.fetch_cart(user.as_str()).await {
        Some(cart) => Ok(HttpResponse::Ok().json(cart)),
        None => Ok(HttpResponse::Ok().json(serde_json::json!({ "user_id": user.as_str(), "items": [] }))),
    }
}

route!(replace_cart => Put "/cart" impl CartStore);
pub async fn replace_cart<C: CartStore>(
    user: UserId,
    body: web::Json<ReplaceCartRequest>,
    api: web::Data<CartApi<C>>,
) -> Result<HttpResponse, ServerError> {
    let ReplaceCartRequest { currency, items } = body.into_inner();
    debug!("💻️ PUT cart for {} with {} lines", user.as_str(), items.len());
    let mut cart = Cart::new(user.as_str(), currency.as_str());
    cart.items = items;
    let cart = api.replace_cart(user.as_str(), cart).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(add_cart_item => Post "/cart/items" impl CartStore);
/// Adds a line to the caller's cart, creating the cart if necessary. Adding a product that is already in the cart
/// increases its quantity.
pub async fn add_cart_item<C: CartStore>(
    user: UserId,
    body: web::Json<AddCartItemRequest>,
    api: web::Data<CartApi<C>>,
) -> Result<HttpResponse, ServerError> {
    let AddCartItemRequest { currency, item } = body.into_inner();
    debug!("💻️ POST cart item {} for {}", item.product_id, user.as_str());
    let cart = api.add_item(user.as_str(), &currency, item).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(update_cart_item => Patch "/cart/items/{product_id}" impl CartStore);
/// Sets the quantity of a line. A quantity of zero removes the line.
pub async fn update_cart_item<C: CartStore>(
    user: UserId,
    path: web::Path<String>,
    body: web::Json<UpdateQuantityRequest>,
    api: web::Data<CartApi<C>>,
) -> Result<HttpResponse, ServerError> {
    let product_id = path.into_inner();
    debug!("💻️ PATCH cart item {product_id} for {} to {}", user.as_str(), body.quantity);
    let cart = api.update_quantity(user.as_str(), &product_id, body.quantity).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(clear_cart => Delete "/cart" impl CartStore);
pub async fn clear_cart<C: CartStore>(user: UserId, api: web::Data<CartApi<C>>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ DELETE cart for {}", user.as_str());
    api.clear_cart(user.as_str()).await;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Cart cleared.")))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout/{method}" impl CartStore, PaymentSessionStore, ExchangeRates, CollectionProvider);
/// Starts a checkout of the caller's cart with the payment method in the path (`mobile_money` or `card`).
///
/// The response carries the session id, which doubles as the payment reference that the client polls with, the
/// amount being collected, and, for card payments, the URL to redirect the customer to.
pub async fn checkout<C, S, R, P>(
    user: UserId,
    path: web::Path<String>,
    body: Option<web::Json<CheckoutRequest>>,
    api: web::Data<CheckoutApi<C, S, R, P>>,
) -> Result<HttpResponse, ServerError>
where
    C: CartStore,
    S: PaymentSessionStore,
    R: ExchangeRates,
    P: CollectionProvider,
{
    let method = parse_method(&path)?;
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    debug!("💻️ POST checkout via {method} for {}", user.as_str());
    let result = api.checkout(user.as_str(), method, request).await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(verify_payment => Post "/payments/verify" impl OrderStore, CartStore, PaymentSessionStore, CollectionProvider);
/// Client poll for the outcome of a checkout.
///
/// The poll runs to completion even if the client goes away, so that a verified payment is always materialized.
pub async fn verify_payment<B, C, S, P>(
    user: UserId,
    body: web::Json<VerifyPaymentRequest>,
    api: web::Data<OrderFlowApi<B, C, S, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore + 'static,
    C: CartStore + 'static,
    S: PaymentSessionStore + 'static,
    P: CollectionProvider + 'static,
{
    let reference = body.into_inner().payment_reference;
    debug!("💻️ POST verify payment [{reference}] for {}", user.as_str());
    let task_reference = reference.clone();
    let outcome = actix_web::rt::spawn(async move { api.poll_payment(user.as_str(), &task_reference).await })
        .await
        .map_err(|e| {
            error!("💻️ Payment verification task for [{reference}] was aborted. {e}");
            ServerError::Unspecified(e.to_string())
        })??;
    Ok(HttpResponse::Ok().json(VerifyPaymentResponse::from_outcome(reference, outcome)))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_details => Get "/orders/{reference}" impl OrderStore, CartStore, PaymentSessionStore, CollectionProvider);
pub async fn order_details<B, C, S, P>(
    user: UserId,
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B, C, S, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore,
    C: CartStore,
    S: PaymentSessionStore,
    P: CollectionProvider,
{
    let reference = PaymentReference::from(path.into_inner());
    debug!("💻️ GET order [{reference}] for {}", user.as_str());
    let details = api.fetch_order_details(user.as_str(), &reference).await?;
    Ok(HttpResponse::Ok().json(details))
}

//----------------------------------------------   Fulfillment  ----------------------------------------------------
route!(fulfil_order => Post "/fulfillment" impl OrderStore, FulfillmentProvider);
/// Dispatches the airtime top-up or gift card of a paid order.
///
/// Paid prepaid orders with a recipient are fulfilled automatically. This route covers orders where the recipient
/// is only known after payment, and retries of failed dispatches that never reached the provider.
pub async fn fulfil_order<B, F>(
    user: UserId,
    body: web::Json<FulfillmentCommand>,
    api: web::Data<FulfillmentApi<B, F>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore,
    F: FulfillmentProvider,
{
    let command = body.into_inner();
    debug!("💻️ POST fulfillment for [{}] by {}", command.order_reference, user.as_str());
    let result = api.fulfil_order_for_user(user.as_str(), command).await?;
    Ok(HttpResponse::Ok().json(FulfillmentResponse::from(result)))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(collection_webhook => Post "/collection/{method}" impl OrderStore, CartStore, PaymentSessionStore, CollectionProvider);
/// Payment notifications from the collection providers.
///
/// The raw body is handed to the engine untouched, since the signature is computed over the exact bytes sent. Once a
/// notification is authenticated, every outcome is acknowledged with a 200 so that the provider stops redelivering.
pub async fn collection_webhook<B, C, S, P>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B, C, S, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore,
    C: CartStore,
    S: PaymentSessionStore,
    P: CollectionProvider,
{
    let method = parse_method(&path)?;
    trace!("💻️ Received {method} webhook ({} bytes)", body.len());
    let signature = api.signature_header(method).and_then(|h| header_value(&req, h));
    let outcome = api.handle_collection_webhook(method, &body, signature).await?;
    debug!("💻️ {method} webhook handled. {outcome:?}");
    Ok(HttpResponse::Ok().json(JsonResponse::success("Notification received.")))
}

route!(fulfillment_webhook => Post "/fulfillment" impl OrderStore, FulfillmentProvider);
pub async fn fulfillment_webhook<B, F>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<FulfillmentApi<B, F>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderStore,
    F: FulfillmentProvider,
{
    trace!("💻️ Received fulfillment webhook ({} bytes)", body.len());
    let signature = header_value(&req, api.signature_header());
    match api.handle_fulfillment_webhook(&body, signature).await? {
        Some(result) => debug!("💻️ Order [{}] is {} after fulfillment webhook", result.order.payment_reference, result.order.status),
        None => debug!("💻️ Fulfillment webhook did not match any transaction"),
    }
    Ok(HttpResponse::Ok().json(JsonResponse::success("Notification received.")))
}

fn parse_method(s: &str) -> Result<PaymentMethod, ServerError> {
    PaymentMethod::from_str(s).map_err(|e| {
        debug!("💻️ {e}");
        ServerError::InvalidRequestPath(format!("{s} is not a supported payment method"))
    })
}

fn header_value<'r>(req: &'r HttpRequest, name: &str) -> Option<&'r str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}
