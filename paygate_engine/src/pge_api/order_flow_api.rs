use std::{fmt::Debug, time::Duration};

use log::*;

use crate::{
    db_types::{
        MinorUnits,
        NewOrder,
        NewOrphanedPayment,
        Order,
        OrderStatusType,
        PaymentMethod,
        PaymentReference,
        PaymentSession,
    },
    events::{EventProducers, OrderFailedEvent, OrderPaidEvent},
    helpers::RetryPolicy,
    pge_api::{
        errors::OrderFlowError,
        order_objects::{ConfirmationOutcome, OrderDetails},
    },
    traits::{
        CartStore,
        CollectionProvider,
        CollectionProviders,
        OrderStore,
        PaymentConfirmation,
        PaymentOutcome,
        PaymentSessionStore,
        StatusUpdate,
        TransitionResult,
    },
};

pub const DEFAULT_VERIFY_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// `OrderFlowApi` is the primary API for handling payment confirmations, whether they are pushed to us by a provider
/// webhook or pulled by a client polling for the result of its checkout.
///
/// Both paths converge on [`Self::confirm_payment`], which materializes the order exactly once no matter how many
/// confirmations arrive, or in which order.
pub struct OrderFlowApi<B, C, S, P> {
    db: B,
    carts: C,
    sessions: S,
    providers: CollectionProviders<P>,
    producers: EventProducers,
    retry: RetryPolicy,
    verify_grace_period: Duration,
}

impl<B, C, S, P> Debug for OrderFlowApi<B, C, S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, C, S, P> OrderFlowApi<B, C, S, P> {
    pub fn new(db: B, carts: C, sessions: S, providers: CollectionProviders<P>, producers: EventProducers) -> Self {
        Self {
            db,
            carts,
            sessions,
            providers,
            producers,
            retry: RetryPolicy::default(),
            verify_grace_period: DEFAULT_VERIFY_GRACE_PERIOD,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Polls younger than this return `pending` without querying the provider, to give the webhook a chance to
    /// arrive first.
    pub fn with_verify_grace_period(mut self, grace: Duration) -> Self {
        self.verify_grace_period = grace;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, C, S, P> OrderFlowApi<B, C, S, P>
where
    B: OrderStore,
    C: CartStore,
    S: PaymentSessionStore,
    P: CollectionProvider,
{
    /// Applies a provider's verdict on a payment.
    ///
    /// | Outcome     | Order exists        | Session exists | Result                                         |
    /// |-------------|---------------------|----------------|------------------------------------------------|
    /// | `succeeded` | yes                 | any            | `pending → paid` applied or absorbed           |
    /// | `succeeded` | no                  | yes            | order materialized, then `pending → paid`      |
    /// | `succeeded` | no                  | no             | recorded as an orphaned payment                |
    /// | `succeeded` | no                  | yes, cart gone | orphan recorded, session closed, error         |
    /// | `failed`    | yes, `pending`      | any            | `pending → failed`                             |
    /// | `failed`    | yes, any other      | any            | absorbed                                       |
    /// | `failed`    | no                  | any            | session discarded, cart kept                   |
    /// | `pending`   | any                 | any            | nothing happens                                |
    ///
    /// A verified payment whose cart has been emptied or deleted cannot become an order. It is recorded as an orphan
    /// and [`OrderFlowError::CartMissingOrEmpty`] is returned, so the money is never lost without a trace.
    ///
    /// A successful confirmation that reports a different amount or currency from the one the session was opened
    /// for is refused with [`OrderFlowError::AmountMismatch`], and nothing is written.
    ///
    /// The [`OrderPaidEvent`] is published only by the caller that applied the `pending → paid` transition, so
    /// subscribers see each paid order exactly once.
    pub async fn confirm_payment(
        &self,
        confirmation: PaymentConfirmation,
        provider_name: &str,
    ) -> Result<ConfirmationOutcome, OrderFlowError> {
        let reference = confirmation.reference.clone();
        match confirmation.outcome {
            PaymentOutcome::Pending => {
                trace!("🔄️ Payment [{reference}] is still pending at {provider_name}");
                match self.db.fetch_order_by_reference(&reference).await? {
                    Some(order) => Ok(ConfirmationOutcome::Settled(order)),
                    None => Ok(ConfirmationOutcome::Pending),
                }
            },
            PaymentOutcome::Failed => self.reject_payment(confirmation, provider_name).await,
            PaymentOutcome::Succeeded => self.accept_payment(confirmation, provider_name).await,
        }
    }

    async fn accept_payment(
        &self,
        confirmation: PaymentConfirmation,
        provider_name: &str,
    ) -> Result<ConfirmationOutcome, OrderFlowError> {
        let reference = confirmation.reference.clone();
        let session = self.sessions.get(&reference).await;
        let existing = self.db.fetch_order_by_reference(&reference).await?;
        match (&session, &existing) {
            (Some(s), _) => check_amount(&confirmation, s.amount, &s.currency)?,
            (None, Some(o)) => check_amount(&confirmation, o.amount, &o.currency)?,
            (None, None) => {},
        }
        let order = match existing {
            Some(order) => Some(order),
            None => match self.materialize(&reference, session).await {
                Err(OrderFlowError::CartMissingOrEmpty(cart_ref)) => {
                    self.record_orphan(confirmation, provider_name).await?;
                    if self.sessions.consume(&reference).await.is_ok() {
                        debug!("🔄️ Payment session [{reference}] closed. Its cart is gone.");
                    }
                    return Err(OrderFlowError::CartMissingOrEmpty(cart_ref));
                },
                result => result?,
            },
        };
        let Some(order) = order else {
            self.record_orphan(confirmation, provider_name).await?;
            return Ok(ConfirmationOutcome::Orphaned);
        };
        if order.status != OrderStatusType::Pending {
            trace!("🔄️ Order [{reference}] is already {}. Confirmation absorbed.", order.status);
            return Ok(ConfirmationOutcome::Settled(order));
        }
        let update = StatusUpdate::new(OrderStatusType::Paid)
            .with_note(format!("payment confirmed by {provider_name}"))
            .with_transaction_id(confirmation.provider_transaction_id.clone());
        let order = match self.db.transition_order(&reference, update).await? {
            TransitionResult::Applied(order) => {
                info!("🔄️💰️ Order [{reference}] is paid. {} {}", order.amount, order.currency);
                self.call_order_paid_hook(&order).await;
                order
            },
            TransitionResult::Absorbed(order) => order,
        };
        Ok(ConfirmationOutcome::Settled(order))
    }

    async fn reject_payment(
        &self,
        confirmation: PaymentConfirmation,
        provider_name: &str,
    ) -> Result<ConfirmationOutcome, OrderFlowError> {
        let reference = confirmation.reference.clone();
        let reason = confirmation.reason.clone().unwrap_or_else(|| "payment declined".to_string());
        let mut failed_order = None;
        if self.db.fetch_order_by_reference(&reference).await?.is_some() {
            let update = StatusUpdate::new(OrderStatusType::Failed)
                .only_from(&[OrderStatusType::Pending])
                .with_failure_reason(format!("{provider_name}: {reason}"));
            match self.db.transition_order(&reference, update).await? {
                TransitionResult::Applied(order) => {
                    info!("🔄️❌️ Order [{reference}] failed: {reason}");
                    self.call_order_failed_hook(&order, &reason).await;
                    failed_order = Some(order);
                },
                TransitionResult::Absorbed(current) => {
                    debug!("🔄️ Order [{reference}] is {}. Late failure notice absorbed.", current.status);
                    return Ok(ConfirmationOutcome::Settled(current));
                },
            }
        }
        if self.sessions.consume(&reference).await.is_ok() {
            info!("🔄️❌️ Payment [{reference}] was declined by {provider_name}: {reason}. Session discarded, cart kept.");
        }
        Ok(ConfirmationOutcome::Rejected { order: failed_order, reason })
    }

    /// Turns a payment session and its cart into an order row.
    ///
    /// Returns `Ok(None)` only if there is neither a session nor an order for the reference, i.e. the payment is an
    /// orphan.
    ///
    /// The order table is re-checked whenever the session or the cart is missing, because a concurrent winner
    /// deletes both only after it has committed the order.
    async fn materialize(
        &self,
        reference: &PaymentReference,
        session: Option<PaymentSession>,
    ) -> Result<Option<Order>, OrderFlowError> {
        let Some(session) = session else {
            return Ok(self.db.fetch_order_by_reference(reference).await?);
        };
        let cart = self.carts.get(&session.cart_ref).await.filter(|c| !c.is_empty());
        if cart.is_none() || session.items.is_empty() {
            return match self.db.fetch_order_by_reference(reference).await? {
                Some(order) => Ok(Some(order)),
                None => {
                    warn!("🔄️ Payment [{reference}] cannot be materialized. The cart of {} is gone.", session.cart_ref);
                    Err(OrderFlowError::CartMissingOrEmpty(session.cart_ref))
                },
            };
        }
        let result = self.db.insert_order(NewOrder::from_session(&session)).await?;
        if result.was_inserted() {
            debug!("🔄️📦️ Order [{reference}] materialized with id {}", result.order().id);
            self.carts.delete(&session.cart_ref).await;
            if let Err(e) = self.sessions.consume(reference).await {
                warn!("🔄️ Could not discard payment session [{reference}] after materializing its order: {e}");
            }
        }
        Ok(Some(result.into_order()))
    }

    async fn record_orphan(&self, confirmation: PaymentConfirmation, provider_name: &str) -> Result<(), OrderFlowError> {
        let reference = confirmation.reference.clone();
        warn!(
            "🔄️👻️ Verified payment [{reference}] from {provider_name} cannot be matched to an order. Recording it for \
             manual reconciliation."
        );
        let orphan = NewOrphanedPayment {
            payment_reference: reference.clone(),
            provider: provider_name.to_string(),
            status: "succeeded".to_string(),
            amount: confirmation.amount,
            currency: confirmation.currency,
            payload: confirmation.raw,
        };
        if self.db.record_orphaned_payment(orphan).await?.is_none() {
            debug!("🔄️👻️ Orphaned payment [{reference}] was already on record");
        }
        Ok(())
    }

    /// Handles a client poll for the outcome of its checkout.
    ///
    /// If an order already exists it is returned directly. Otherwise, once the verification grace period has elapsed
    /// and the provider supports it, the provider is queried and the result is applied with
    /// [`Self::confirm_payment`], racing safely with any webhook for the same payment.
    ///
    /// Sessions and orders belonging to other users are reported as missing.
    pub async fn poll_payment(
        &self,
        user_id: &str,
        reference: &PaymentReference,
    ) -> Result<ConfirmationOutcome, OrderFlowError> {
        if let Some(order) = self.db.fetch_order_by_reference(reference).await? {
            if order.user_id != user_id {
                return Err(OrderFlowError::OrderNotFound(reference.clone()));
            }
            return Ok(ConfirmationOutcome::Settled(order));
        }
        let session = match self.sessions.get(reference).await {
            Some(s) if s.user_id == user_id => s,
            _ => {
                return match self.db.fetch_order_by_reference(reference).await? {
                    Some(order) if order.user_id == user_id => Ok(ConfirmationOutcome::Settled(order)),
                    _ => Err(OrderFlowError::SessionExpiredOrMissing(reference.clone())),
                };
            },
        };
        let provider = self
            .providers
            .get(session.payment_method)
            .ok_or(OrderFlowError::UnsupportedPaymentMethod(session.payment_method))?;
        let within_grace = session.age().to_std().map(|age| age < self.verify_grace_period).unwrap_or(true);
        if !provider.supports_verify() || within_grace {
            trace!("🔄️ Payment [{reference}] is awaiting its webhook");
            return Ok(ConfirmationOutcome::Pending);
        }
        let label = format!("{} verify {reference}", provider.provider_name());
        let confirmation = self.retry.run(&label, |_| provider.verify(reference)).await?;
        self.confirm_payment(confirmation, provider.provider_name()).await
    }

    /// Authenticates and applies a collection provider webhook.
    ///
    /// Bodies that fail signature verification are rejected with [`OrderFlowError::Signature`] before any state is
    /// read or written.
    pub async fn handle_collection_webhook(
        &self,
        method: PaymentMethod,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<ConfirmationOutcome, OrderFlowError> {
        let provider = self.providers.get(method).ok_or(OrderFlowError::UnsupportedPaymentMethod(method))?;
        let confirmation = provider.build_webhook_event(body, signature).map_err(|e| {
            warn!("🔐️ Rejected {} webhook: {e}", provider.provider_name());
            OrderFlowError::from(e)
        })?;
        debug!("🔄️ {} webhook for [{}]: {:?}", provider.provider_name(), confirmation.reference, confirmation.outcome);
        self.confirm_payment(confirmation, provider.provider_name()).await
    }

    /// The signature header of the provider configured for `method`.
    pub fn signature_header(&self, method: PaymentMethod) -> Option<&str> {
        self.providers.get(method).map(|p| p.signature_header())
    }

    /// Fetches an order with its items and fulfillment record. Orders belonging to other users are reported as
    /// missing.
    pub async fn fetch_order_details(
        &self,
        user_id: &str,
        reference: &PaymentReference,
    ) -> Result<OrderDetails, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_reference(reference)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| OrderFlowError::OrderNotFound(reference.clone()))?;
        let items = self.db.fetch_order_items(order.id).await?;
        let fulfillment = self.db.fetch_fulfillment_for_order(order.id).await?;
        Ok(OrderDetails { order, items, fulfillment })
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🔄️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_failed_hook(&self, order: &Order, reason: &str) {
        for emitter in &self.producers.order_failed_producer {
            emitter.publish_event(OrderFailedEvent::new(order.clone(), reason)).await;
        }
    }
}

fn check_amount(confirmation: &PaymentConfirmation, expected: MinorUnits, currency: &str) -> Result<(), OrderFlowError> {
    let amount_ok = confirmation.amount.map(|a| a == expected).unwrap_or(true);
    let currency_ok = confirmation.currency.as_ref().map(|c| c.eq_ignore_ascii_case(currency)).unwrap_or(true);
    if amount_ok && currency_ok {
        return Ok(());
    }
    let received = format!(
        "{} {}",
        confirmation.amount.map(|a| a.to_string()).unwrap_or_else(|| "?".into()),
        confirmation.currency.as_deref().unwrap_or("?")
    );
    warn!(
        "🔐️ Payment [{}] confirmation reports {received}, but {expected} {currency} was expected. Refusing to \
         materialize.",
        confirmation.reference
    );
    Err(OrderFlowError::AmountMismatch {
        reference: confirmation.reference.clone(),
        expected: format!("{expected} {currency}"),
        received,
    })
}
