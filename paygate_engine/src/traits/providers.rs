use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{FulfillmentStatus, MinorUnits, PaymentMethod, PaymentReference, ProductType};

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network failures, timeouts, rate limiting and provider-side 5xx responses. Safe to retry.
    #[error("Provider is temporarily unavailable: {0}")]
    Transient(String),
    /// The provider declined the request. Retrying will not help.
    #[error("Provider rejected the request: {0}")]
    Rejected(String),
    /// The request could not be sent because it is invalid (e.g. a malformed phone number).
    #[error("Invalid provider request: {0}")]
    Validation(String),
    #[error("Operation not supported by this provider: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Webhook signature verification failed: {0}")]
    Signature(String),
    #[error("Could not interpret webhook payload: {0}")]
    Payload(String),
}

/// Authenticates the raw body of an inbound notification.
pub trait WebhookVerifier {
    /// Checks `signature` against the body. A missing signature is a failure.
    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError>;
}

//--------------------------------------      Collection      ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerContact {
    pub phone: Option<String>,
    /// The mobile network operator, e.g. `MTN` or `VODAFONE`
    pub network: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionRequest {
    /// Doubles as the provider-side idempotency key
    pub reference: PaymentReference,
    pub amount: MinorUnits,
    pub currency: String,
    pub customer: CustomerContact,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandleStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHandle {
    pub status: HandleStatus,
    pub provider_reference: Option<String>,
    /// Hosted checkout page, for providers that redirect the user
    pub redirect_url: Option<String>,
    pub message: Option<String>,
}

impl ProviderHandle {
    pub fn accepted() -> Self {
        Self { status: HandleStatus::Accepted, provider_reference: None, redirect_url: None, message: None }
    }

    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self { status: HandleStatus::Rejected, provider_reference: None, redirect_url: None, message: Some(message.into()) }
    }

    pub fn with_redirect_url<S: Into<String>>(mut self, url: S) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn with_provider_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.provider_reference = Some(reference.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Pending,
}

/// A provider's verdict on a payment, either pushed to us in a webhook or pulled with `verify`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub reference: PaymentReference,
    pub outcome: PaymentOutcome,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub reason: Option<String>,
    /// The verified raw payload, kept for orphan records
    #[serde(skip)]
    pub raw: String,
}

impl PaymentConfirmation {
    pub fn new(reference: PaymentReference, outcome: PaymentOutcome) -> Self {
        Self {
            reference,
            outcome,
            amount: None,
            currency: None,
            provider_transaction_id: None,
            reason: None,
            raw: String::new(),
        }
    }

    pub fn with_amount<S: Into<String>>(mut self, amount: MinorUnits, currency: S) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_transaction_id<S: Into<String>>(mut self, id: S) -> Self {
        self.provider_transaction_id = Some(id.into());
        self
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_raw<S: Into<String>>(mut self, raw: S) -> Self {
        self.raw = raw.into();
        self
    }
}

/// A payment provider that collects money from the customer.
#[allow(async_fn_in_trait)]
pub trait CollectionProvider {
    fn provider_name(&self) -> &str;

    /// The currency this provider collects in. Carts priced in other currencies are converted at checkout.
    fn currency(&self) -> &str;

    /// The HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &str;

    /// Whether [`Self::verify`] is available. Push-only providers confirm exclusively through webhooks.
    fn supports_verify(&self) -> bool {
        true
    }

    /// Asks the provider to start collecting the payment.
    async fn initiate(&self, request: &CollectionRequest) -> Result<ProviderHandle, ProviderError>;

    /// Queries the provider for the status of the payment.
    async fn verify(&self, reference: &PaymentReference) -> Result<PaymentConfirmation, ProviderError>;

    /// Authenticates and parses a webhook body. Bodies that fail verification are never parsed.
    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<PaymentConfirmation, WebhookError>;
}

/// The configured collection providers, keyed by payment method.
#[derive(Clone)]
pub struct CollectionProviders<P> {
    providers: HashMap<PaymentMethod, P>,
}

impl<P> Default for CollectionProviders<P> {
    fn default() -> Self {
        Self { providers: HashMap::new() }
    }
}

impl<P> CollectionProviders<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, method: PaymentMethod, provider: P) -> Self {
        self.providers.insert(method, provider);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&P> {
        self.providers.get(&method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &PaymentMethod> {
        self.providers.keys()
    }
}

//--------------------------------------     Fulfillment      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct FulfillmentRequest {
    pub order_reference: PaymentReference,
    pub product_type: ProductType,
    /// The provider's product (gift card or operator plan) id, if the order names one
    pub product_id: Option<String>,
    pub recipient: String,
    pub amount: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct FulfillmentOutcome {
    pub external_id: String,
    pub status: FulfillmentStatus,
    pub amount: MinorUnits,
    pub recipient: String,
    pub metadata: serde_json::Value,
}

/// An asynchronous status update for a fulfillment transaction.
#[derive(Debug, Clone)]
pub struct FulfillmentUpdate {
    pub external_id: String,
    pub status: FulfillmentStatus,
    pub reason: Option<String>,
}

/// A provider that dispatches prepaid products (airtime top-ups, gift cards) after payment.
#[allow(async_fn_in_trait)]
pub trait FulfillmentProvider {
    fn provider_name(&self) -> &str;

    fn signature_header(&self) -> &str;

    async fn initiate(&self, request: &FulfillmentRequest) -> Result<FulfillmentOutcome, ProviderError>;

    /// Queries the provider for the status of a previously submitted transaction.
    async fn verify(&self, external_id: &str) -> Result<FulfillmentOutcome, ProviderError>;

    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<FulfillmentUpdate, WebhookError>;
}
