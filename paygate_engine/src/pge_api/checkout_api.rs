use std::{fmt::Debug, time::Duration};

use log::*;

use crate::{
    db_types::{NewPaymentSession, PaymentMethod, PaymentReference},
    helpers::RetryPolicy,
    pge_api::{
        errors::OrderFlowError,
        exchange_rate_api::ExchangeRateApi,
        order_objects::{CheckoutRequest, CheckoutResult},
    },
    traits::{
        CartStore,
        CollectionProvider,
        CollectionProviders,
        CollectionRequest,
        ExchangeRates,
        HandleStatus,
        PaymentSessionStore,
    },
};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// `CheckoutApi` turns a user's cart into a payment session and asks the chosen collection provider to start
/// collecting.
pub struct CheckoutApi<C, S, R, P> {
    carts: C,
    sessions: S,
    rates: ExchangeRateApi<R>,
    providers: CollectionProviders<P>,
    retry: RetryPolicy,
    session_ttl: Duration,
}

impl<C, S, R, P> Debug for CheckoutApi<C, S, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<C, S, R, P> CheckoutApi<C, S, R, P> {
    pub fn new(carts: C, sessions: S, rates: R, providers: CollectionProviders<P>) -> Self {
        Self {
            carts,
            sessions,
            rates: ExchangeRateApi::new(rates),
            providers,
            retry: RetryPolicy::default(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

impl<C, S, R, P> CheckoutApi<C, S, R, P>
where
    C: CartStore,
    S: PaymentSessionStore,
    R: ExchangeRates,
    P: CollectionProvider,
{
    /// Starts a checkout for the user's current cart.
    ///
    /// * The cart must exist and contain at least one item, otherwise [`OrderFlowError::CartMissingOrEmpty`].
    /// * Carts that mix a prepaid product type with anything else are rejected.
    /// * If the provider collects in a different currency from the cart, the total is converted at the stored
    ///   exchange rate, and the rate is recorded on the session.
    /// * A payment session is opened, and its id is sent to the provider as the idempotency key.
    ///
    /// If the provider rejects the request, the session is discarded and the cart is left untouched so that the user
    /// can try again. If the provider cannot be reached, the session is kept until its TTL elapses, since the provider
    /// may still have received the request.
    pub async fn checkout(
        &self,
        user_id: &str,
        method: PaymentMethod,
        request: CheckoutRequest,
    ) -> Result<CheckoutResult, OrderFlowError> {
        let provider = self.providers.get(method).ok_or(OrderFlowError::UnsupportedPaymentMethod(method))?;
        let cart = self
            .carts
            .get(user_id)
            .await
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OrderFlowError::CartMissingOrEmpty(user_id.to_string()))?;
        let product_type = cart.product_type().ok_or_else(|| {
            OrderFlowError::Validation("Airtime and gift cards must be checked out on their own".to_string())
        })?;
        let out_of_range = || OrderFlowError::Validation("The cart total is too large to collect".to_string());
        let subtotal = cart.total().ok_or_else(out_of_range)?;
        if !subtotal.is_positive() {
            return Err(OrderFlowError::Validation(format!("Cannot check out a cart worth {subtotal}")));
        }
        let mut new_session = NewPaymentSession::for_cart(&cart, method, product_type).ok_or_else(out_of_range)?;
        if let Some(recipient) = request.recipient.as_ref().filter(|r| !r.trim().is_empty()) {
            new_session = new_session.with_recipient(recipient.trim());
        }
        if cart.currency != provider.currency() {
            let rate = self.rates.fetch_last_rate(&cart.currency, provider.currency()).await?;
            let amount = rate.convert(subtotal).ok_or_else(out_of_range)?;
            debug!("💳️ Converted {subtotal} {} to {amount} {} using {rate}", cart.currency, provider.currency());
            new_session = new_session.with_conversion(amount, provider.currency(), rate.rate);
        }
        let session = self.sessions.create(new_session, self.session_ttl).await?;
        let collection = CollectionRequest {
            reference: session.id.clone(),
            amount: session.amount,
            currency: session.currency.clone(),
            customer: request.contact,
            description: format!("Order {}", session.id),
        };
        let label = format!("{} initiate {}", provider.provider_name(), session.id);
        let handle = match self.retry.run(&label, |_| provider.initiate(&collection)).await {
            Ok(handle) => handle,
            Err(e) => {
                if !e.is_transient() {
                    self.discard_session(&session.id).await;
                }
                warn!("💳️ Checkout {} via {} failed: {e}", session.id, provider.provider_name());
                return Err(e.into());
            },
        };
        if handle.status == HandleStatus::Rejected {
            self.discard_session(&session.id).await;
            let reason = handle.message.unwrap_or_else(|| "declined".to_string());
            info!("💳️ {} rejected checkout {}: {reason}", provider.provider_name(), session.id);
            return Err(OrderFlowError::ProviderRejected(reason));
        }
        info!(
            "💳️ Checkout {} for {user_id} accepted by {}. Collecting {} {}",
            session.id,
            provider.provider_name(),
            session.amount,
            session.currency
        );
        Ok(CheckoutResult {
            session_id: session.id,
            amount: session.amount,
            currency: session.currency,
            status: handle.status,
            redirect_url: handle.redirect_url,
        })
    }

    async fn discard_session(&self, id: &PaymentReference) {
        if self.sessions.consume(id).await.is_ok() {
            debug!("💳️ Payment session {id} discarded. The cart is retained.");
        }
    }
}
