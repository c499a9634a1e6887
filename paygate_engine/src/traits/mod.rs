//! #  Storage and provider contracts.
//!
//! This module provides the interfaces that define the contracts between the engine and its *backends*.
//!
//! ## Durable storage
//! [`OrderStore`] is the durable record of orders, their items, fulfillment transactions, status history and orphaned
//! payments. Mutual exclusion between concurrent confirmations is enforced here, by the unique payment reference and
//! by compare-and-set status updates, rather than by locks in the calling code.
//!
//! [`ExchangeRates`] stores the prevailing conversion rate between two currencies.
//!
//! ## Ephemeral storage
//! [`CartStore`] and [`PaymentSessionStore`] hold short-lived, per-user state. Losing them is survivable; a lost
//! session only means a late payment is recorded as an orphan.
//!
//! ## Providers
//! [`CollectionProvider`] and [`FulfillmentProvider`] are the capabilities a third-party integration must expose.
//! Concrete implementations live outside the engine.
mod data_objects;
mod ephemeral_stores;
mod exchange_rates;
mod order_store;
mod providers;

pub use data_objects::{InsertOrderResult, StatusUpdate, TransitionResult};
pub use ephemeral_stores::{CartStore, CartStoreError, PaymentSessionStore, SessionStoreError};
pub use exchange_rates::{ExchangeRateError, ExchangeRates};
pub use order_store::{OrderStore, OrderStoreError};
pub use providers::{
    CollectionProvider,
    CollectionProviders,
    CollectionRequest,
    CustomerContact,
    FulfillmentOutcome,
    FulfillmentProvider,
    FulfillmentRequest,
    FulfillmentUpdate,
    HandleStatus,
    PaymentConfirmation,
    PaymentOutcome,
    ProviderError,
    ProviderHandle,
    WebhookError,
    WebhookVerifier,
};
