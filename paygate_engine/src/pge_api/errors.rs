use thiserror::Error;

use crate::{
    db_types::{OrderStatusType, PaymentMethod, PaymentReference},
    traits::{CartStoreError, ExchangeRateError, OrderStoreError, ProviderError, SessionStoreError, WebhookError},
};

/// Every failure the checkout, order-flow and fulfillment APIs can report.
///
/// Idempotency conflicts never appear here: a caller that loses an insert race receives the winner's order.
#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Signature verification failed: {0}")]
    Signature(String),
    #[error("Payment session {0} has expired or does not exist")]
    SessionExpiredOrMissing(PaymentReference),
    #[error("The cart for {0} is missing or empty")]
    CartMissingOrEmpty(String),
    #[error("The payment provider is unavailable: {0}")]
    ProviderTransient(String),
    #[error("The payment provider rejected the request: {0}")]
    ProviderRejected(String),
    #[error("Confirmation for {reference} does not match the session. Expected {expected}, got {received}")]
    AmountMismatch { reference: PaymentReference, expected: String, received: String },
    #[error("Order {0} does not exist")]
    OrderNotFound(PaymentReference),
    #[error("Order {reference} is {status}, which does not allow this operation")]
    InvalidOrderState { reference: PaymentReference, status: OrderStatusType },
    #[error("Payment method {0} is not configured")]
    UnsupportedPaymentMethod(PaymentMethod),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<OrderStoreError> for OrderFlowError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::OrderNotFound(r) => OrderFlowError::OrderNotFound(r),
            OrderStoreError::EmptyOrder => OrderFlowError::Validation(e.to_string()),
            e => OrderFlowError::DatabaseError(e.to_string()),
        }
    }
}

impl From<ProviderError> for OrderFlowError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Transient(s) => OrderFlowError::ProviderTransient(s),
            ProviderError::Rejected(s) => OrderFlowError::ProviderRejected(s),
            ProviderError::Validation(s) | ProviderError::Unsupported(s) => OrderFlowError::Validation(s),
        }
    }
}

impl From<ExchangeRateError> for OrderFlowError {
    fn from(e: ExchangeRateError) -> Self {
        match e {
            ExchangeRateError::RateDoesNotExist(pair) => {
                OrderFlowError::Validation(format!("Unsupported currency conversion {pair}"))
            },
            ExchangeRateError::InvalidRate(s) => OrderFlowError::Validation(s),
            ExchangeRateError::DatabaseError(s) => OrderFlowError::DatabaseError(s),
        }
    }
}

impl From<CartStoreError> for OrderFlowError {
    fn from(e: CartStoreError) -> Self {
        match e {
            CartStoreError::NotFound(user) => OrderFlowError::CartMissingOrEmpty(user),
            e => OrderFlowError::Validation(e.to_string()),
        }
    }
}

impl From<SessionStoreError> for OrderFlowError {
    fn from(e: SessionStoreError) -> Self {
        match e {
            SessionStoreError::NotFound(r) => OrderFlowError::SessionExpiredOrMissing(r),
            e => OrderFlowError::Validation(e.to_string()),
        }
    }
}

impl From<WebhookError> for OrderFlowError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::Signature(s) => OrderFlowError::Signature(s),
            WebhookError::Payload(s) => OrderFlowError::Validation(s),
        }
    }
}
