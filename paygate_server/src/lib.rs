//! Payment Gateway Server
//!
//! An HTTP front end for the payment gateway engine. Customers build a cart, check it out with mobile money or a
//! card, and poll for the outcome. Payment and fulfillment providers report back through signed webhooks.
//!
//! ## Routes
//! * `GET /health`
//! * `GET | PUT | DELETE /api/cart`, `POST /api/cart/items`, `PATCH /api/cart/items/{product_id}`
//! * `POST /api/checkout/{method}` starts a checkout of the caller's cart.
//! * `POST /api/payments/verify` polls the outcome of a checkout.
//! * `POST /api/fulfillment` dispatches the airtime or gift card of a paid order.
//! * `GET /api/orders/{reference}` returns an order with its items and fulfillment record.
//! * `POST /webhook/collection/{method}` and `POST /webhook/fulfillment` receive provider notifications.
//!
//! The caller of the `/api` routes is identified by the `X-User-Id` header, which is expected to be set by an
//! authenticating proxy.
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
