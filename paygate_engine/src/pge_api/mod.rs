//! # Payment gateway engine public API
//!
//! The `pge_api` module exposes the programmatic API for the payment gateway engine.
//! The API is modular, so that clients of the API can pick and choose the functionality they want.
//!
//! * [`cart_api`] manages the per-user shopping carts.
//! * [`checkout_api`] turns a cart into a payment session and asks a collection provider to start collecting.
//! * [`order_flow_api`] is the primary API for handling payment confirmations, whether they arrive as provider
//!   webhooks or as client polls. It materializes orders exactly once and drives them from `pending` to `paid`.
//! * [`fulfillment_api`] dispatches airtime and gift cards for paid orders, and reconciles fulfillments that were
//!   left hanging.
//! * [`exchange_rate_api`] manages the stored currency conversion rates.
//!
//! The other submodules in this module are support and utility functions and types.
//!
//! # API usage
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying the backends that
//! implement the specific traits required by the API.
//!
//! ```rust,ignore
//! use paygate_engine::{MemoryCartStore, MemorySessionStore, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = OrderFlowApi::new(db, carts, sessions, providers, producers);
//! let outcome = api.poll_payment("alice", &reference).await?;
//! ```

pub mod cart_api;
pub mod checkout_api;
pub mod errors;
pub mod exchange_objects;
pub mod exchange_rate_api;
pub mod fulfillment_api;
pub mod order_flow_api;
pub mod order_objects;
