//! Payment Gateway Engine
//!
//! The payment gateway engine turns shopping carts into paid, and where necessary fulfilled, orders. It sits between
//! a storefront and a set of third-party payment and prepaid-product providers, and is provider-agnostic.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`]). Durable order storage is defined by the [`OrderStore`] trait, with a SQLite
//!    implementation in [`SqliteDatabase`]. Carts and payment sessions are short-lived and live in memory
//!    ([`MemoryCartStore`], [`MemorySessionStore`]).
//! 2. The public API ([`mod@pge_api`]). This provides checkout, payment confirmation, fulfillment and
//!    reconciliation. Every path that can be raced (webhooks, polls, retries) goes through idempotent writes in the
//!    storage layer, so the API objects themselves hold no locks.
//!
//! The engine also provides a set of events that can be subscribed to. These are emitted when an order is paid,
//! completed, or fails. A simple Actor framework is used so that you can easily hook into these events and perform
//! custom actions, such as dispatching a top-up as soon as its order is paid.
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod db_types;
pub mod ephemeral;
pub mod events;
pub mod helpers;
pub mod pge_api;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use ephemeral::{MemoryCartStore, MemorySessionStore};
pub use pge_api::{
    cart_api::CartApi,
    checkout_api::CheckoutApi,
    errors::OrderFlowError,
    exchange_rate_api::ExchangeRateApi,
    fulfillment_api::FulfillmentApi,
    order_flow_api::OrderFlowApi,
    order_objects,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{InsertOrderResult, OrderStore, TransitionResult};
