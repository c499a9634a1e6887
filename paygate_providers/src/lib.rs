//! Provider adapters for the payment gateway.
//!
//! * [`MobileMoneyProvider`] collects payments from mobile money wallets. It is push-only.
//! * [`CardProvider`] collects card and bank payments through a hosted checkout page.
//! * [`PrepaidProvider`] dispatches airtime top-ups and gift cards once an order has been paid for.
//!
//! All adapters authenticate inbound webhooks with [`HmacVerifier`] before parsing them, and make outbound calls via
//! [`RestClient`], which puts an explicit timeout on every request.
mod adapter;
mod card;
mod client;
mod config;
mod error;
mod fulfillment;
pub mod helpers;
mod mobile_money;
mod signature;
mod token_cache;

pub use adapter::CollectionAdapter;
pub use card::{CardProvider, CARD_SIGNATURE_HEADER};
pub use client::{RestClient, DEFAULT_PROVIDER_TIMEOUT};
pub use config::{CardConfig, MobileMoneyConfig, PrepaidConfig};
pub use error::ProviderApiError;
pub use fulfillment::{PrepaidProvider, PREPAID_SIGNATURE_HEADER};
pub use mobile_money::{MobileMoneyProvider, MOBILE_MONEY_SIGNATURE_HEADER};
pub use signature::{HmacAlgorithm, HmacVerifier, SignatureEncoding};
pub use token_cache::{TokenCache, DEFAULT_REFRESH_MARGIN};
