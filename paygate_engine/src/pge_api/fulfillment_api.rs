//! The FulfillmentApi dispatches the prepaid product (airtime or a gift card) of a paid order, and keeps the order
//! status in step with the fulfillment provider.
//!
//! An order is claimed for fulfillment by moving it from `paid` to `processing`. Only the caller that wins that
//! transition talks to the provider, so a product is never dispatched twice for the same order, however many times
//! fulfillment is requested.
use std::fmt::Debug;

use chrono::Duration;
use log::*;

use crate::{
    db_types::{
        FulfillmentStatus,
        FulfillmentTransaction,
        MinorUnits,
        NewFulfillmentTransaction,
        Order,
        OrderStatusType,
    },
    events::{EventProducers, OrderCompletedEvent, OrderFailedEvent},
    helpers::RetryPolicy,
    pge_api::{
        errors::OrderFlowError,
        order_objects::{FulfillmentCommand, FulfillmentResult, ReconciliationReport},
    },
    traits::{
        FulfillmentProvider,
        FulfillmentRequest,
        FulfillmentUpdate,
        OrderStore,
        ProviderError,
        StatusUpdate,
        TransitionResult,
    },
};

pub struct FulfillmentApi<B, F> {
    db: B,
    provider: F,
    producers: EventProducers,
    retry: RetryPolicy,
}

impl<B, F> Debug for FulfillmentApi<B, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FulfillmentApi")
    }
}

impl<B, F> FulfillmentApi<B, F> {
    pub fn new(db: B, provider: F, producers: EventProducers) -> Self {
        Self { db, provider, producers, retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl<B, F> FulfillmentApi<B, F>
where
    B: OrderStore,
    F: FulfillmentProvider,
{
    /// Dispatches the product of a paid order.
    ///
    /// * Orders that are already `processing` or `completed` are returned as they are. Nothing is sent.
    /// * `pending` and `failed` orders cannot be fulfilled.
    /// * If the command names an amount, it must equal the value of the order in the currency the cart was priced in.
    ///
    /// If the provider declines the transaction, or cannot be reached after all retries, the order is marked `failed`
    /// with a `fulfillment_failed` reason and no fulfillment transaction is stored. The payment is not refunded.
    pub async fn fulfil_order(&self, command: FulfillmentCommand) -> Result<FulfillmentResult, OrderFlowError> {
        let reference = command.order_reference.clone();
        let order = self
            .db
            .fetch_order_by_reference(&reference)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(reference.clone()))?;
        if !order.product_type.requires_fulfillment() {
            return Err(OrderFlowError::Validation(format!("Order {reference} has nothing to fulfil")));
        }
        let (face_value, currency) = face_value(&order);
        if let Some(amount) = command.amount {
            if amount != face_value {
                warn!("🎁️ Fulfillment of [{reference}] requested for {amount}, but the order is worth {face_value}");
                return Err(OrderFlowError::Validation(format!(
                    "Order {reference} is worth {face_value} {currency}, not {amount}"
                )));
            }
        }
        let recipient = command
            .recipient
            .filter(|r| !r.trim().is_empty())
            .or_else(|| order.metadata.recipient.clone())
            .ok_or_else(|| OrderFlowError::Validation(format!("Order {reference} has no recipient")))?;
        match order.status {
            OrderStatusType::Processing | OrderStatusType::Completed => {
                debug!("🎁️ Order [{reference}] is already {}. Nothing to do.", order.status);
                return self.current_state(order).await;
            },
            OrderStatusType::Pending | OrderStatusType::Failed => {
                return Err(OrderFlowError::InvalidOrderState { reference, status: order.status });
            },
            OrderStatusType::Paid => {},
        }
        let claim = StatusUpdate::new(OrderStatusType::Processing).with_note("fulfillment started");
        let order = match self.db.transition_order(&reference, claim).await? {
            TransitionResult::Applied(order) => order,
            TransitionResult::Absorbed(current) => {
                debug!("🎁️ Order [{reference}] was claimed by another caller. It is now {}.", current.status);
                return self.current_state(current).await;
            },
        };
        let items = self.db.fetch_order_items(order.id).await?;
        let request = FulfillmentRequest {
            order_reference: reference.clone(),
            product_type: order.product_type,
            product_id: items.first().map(|i| i.product_id.clone()),
            recipient,
            amount: face_value,
            currency,
        };
        info!("🎁️ Dispatching {} for order [{reference}] to {}", order.product_type, request.recipient);
        let label = format!("{} fulfil {reference}", self.provider.provider_name());
        let outcome = match self.retry.run(&label, |_| self.provider.initiate(&request)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_order(&order, &e.to_string()).await?;
                return Err(e.into());
            },
        };
        if outcome.status == FulfillmentStatus::Failed {
            let reason = format!("{} declined transaction {}", self.provider.provider_name(), outcome.external_id);
            self.fail_order(&order, &reason).await?;
            return Err(OrderFlowError::ProviderRejected(reason));
        }
        let transaction = NewFulfillmentTransaction {
            external_id: outcome.external_id,
            status: outcome.status,
            amount: outcome.amount,
            recipient: outcome.recipient,
            metadata: outcome.metadata,
        };
        let (stored, result) = self.db.record_fulfillment(&reference, transaction).await?;
        let order = match result {
            TransitionResult::Applied(order) => {
                info!("🎁️ Order [{reference}] is {}. Transaction {}.", order.status, stored.external_id);
                if order.status == OrderStatusType::Completed {
                    self.call_order_completed_hook(&order, &stored).await;
                }
                order
            },
            TransitionResult::Absorbed(order) => {
                info!("🎁️ Transaction {} for order [{reference}] is pending at the provider", stored.external_id);
                order
            },
        };
        Ok(FulfillmentResult { order, transaction: Some(stored) })
    }

    /// [`Self::fulfil_order`] on behalf of a customer. Orders belonging to other users are reported as missing.
    pub async fn fulfil_order_for_user(
        &self,
        user_id: &str,
        command: FulfillmentCommand,
    ) -> Result<FulfillmentResult, OrderFlowError> {
        match self.db.fetch_order_by_reference(&command.order_reference).await? {
            Some(order) if order.user_id == user_id => self.fulfil_order(command).await,
            _ => Err(OrderFlowError::OrderNotFound(command.order_reference)),
        }
    }

    /// Fulfils a freshly paid order automatically, if it is a prepaid product with a known recipient.
    pub async fn fulfil_paid_order(&self, order: &Order) -> Result<Option<FulfillmentResult>, OrderFlowError> {
        if !order.product_type.requires_fulfillment() || order.metadata.recipient.is_none() {
            return Ok(None);
        }
        let command = FulfillmentCommand::new(order.payment_reference.clone());
        self.fulfil_order(command).await.map(Some)
    }

    /// Applies an asynchronous status update for a fulfillment transaction.
    ///
    /// Only `pending` transactions are updated. Repeated or late updates are absorbed and the current state is
    /// returned. Updates for unknown transactions are ignored and `None` is returned.
    pub async fn apply_fulfillment_update(
        &self,
        update: FulfillmentUpdate,
    ) -> Result<Option<FulfillmentResult>, OrderFlowError> {
        let external_id = update.external_id.clone();
        let reason = update.reason.map(|r| format!("fulfillment_failed: {r}"));
        let Some((tx, result)) = self.db.resolve_fulfillment(&external_id, update.status, reason.clone()).await? else {
            warn!("🎁️ Received an update for unknown fulfillment transaction {external_id}. Ignoring it.");
            return Ok(None);
        };
        let order = match result {
            TransitionResult::Applied(order) => {
                info!("🎁️ Order [{}] is {} after fulfillment update {external_id}", order.payment_reference, order.status);
                match order.status {
                    OrderStatusType::Completed => self.call_order_completed_hook(&order, &tx).await,
                    OrderStatusType::Failed => {
                        let reason = reason.unwrap_or_else(|| "fulfillment_failed".to_string());
                        self.call_order_failed_hook(&order, &reason).await
                    },
                    _ => {},
                }
                order
            },
            TransitionResult::Absorbed(order) => {
                trace!("🎁️ Fulfillment update {external_id} absorbed. Order is {}.", order.status);
                order
            },
        };
        Ok(Some(FulfillmentResult { order, transaction: Some(tx) }))
    }

    /// Authenticates and applies a fulfillment provider webhook.
    pub async fn handle_fulfillment_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<Option<FulfillmentResult>, OrderFlowError> {
        let update = self.provider.build_webhook_event(body, signature).map_err(|e| {
            warn!("🔐️ Rejected {} webhook: {e}", self.provider.provider_name());
            OrderFlowError::from(e)
        })?;
        self.apply_fulfillment_update(update).await
    }

    pub fn signature_header(&self) -> &str {
        self.provider.signature_header()
    }

    /// Resolves orders that have been `processing` for longer than `older_than`.
    ///
    /// Pending fulfillment transactions are re-queried at the provider. Orders with no transaction at all were
    /// interrupted between being claimed and the provider's answer being recorded; they are marked `failed` with a
    /// `fulfillment_interrupted` reason.
    pub async fn reconcile_stale(&self, older_than: Duration) -> Result<ReconciliationReport, OrderFlowError> {
        let stale = self.db.fetch_stale_processing_orders(older_than).await?;
        let mut report = ReconciliationReport::default();
        for (order, tx) in stale {
            let reference = order.payment_reference.clone();
            match tx {
                None => {
                    let update = StatusUpdate::new(OrderStatusType::Failed)
                        .only_from(&[OrderStatusType::Processing])
                        .with_failure_reason("fulfillment_interrupted");
                    if let TransitionResult::Applied(order) = self.db.transition_order(&reference, update).await? {
                        warn!("🕰️ Order [{reference}] was stuck in processing with no fulfillment record. Marked failed.");
                        self.call_order_failed_hook(&order, "fulfillment_interrupted").await;
                        report.failed += 1;
                    }
                },
                Some(tx) if tx.status == FulfillmentStatus::Pending => match self.verify_pending(&tx).await {
                    Ok(Some(update)) => {
                        self.apply_fulfillment_update(update).await?;
                        report.resolved += 1;
                    },
                    Ok(None) => report.still_pending += 1,
                    Err(e) => {
                        warn!("🕰️ Could not check fulfillment {} of order [{reference}]: {e}", tx.external_id);
                        report.still_pending += 1;
                    },
                },
                Some(tx) => {
                    warn!(
                        "🕰️ Order [{reference}] is processing, but its fulfillment {} is {}. Needs manual attention.",
                        tx.external_id, tx.status
                    );
                },
            }
        }
        if report.resolved + report.failed + report.still_pending > 0 {
            info!(
                "🕰️ Reconciliation: {} resolved, {} failed, {} still pending",
                report.resolved, report.failed, report.still_pending
            );
        }
        Ok(report)
    }

    async fn verify_pending(&self, tx: &FulfillmentTransaction) -> Result<Option<FulfillmentUpdate>, ProviderError> {
        let label = format!("{} verify {}", self.provider.provider_name(), tx.external_id);
        let outcome = self.retry.run(&label, |_| self.provider.verify(&tx.external_id)).await?;
        if outcome.status == FulfillmentStatus::Pending {
            return Ok(None);
        }
        let reason = (outcome.status == FulfillmentStatus::Failed).then(|| "declined on reconciliation".to_string());
        Ok(Some(FulfillmentUpdate { external_id: tx.external_id.clone(), status: outcome.status, reason }))
    }

    async fn fail_order(&self, order: &Order, reason: &str) -> Result<(), OrderFlowError> {
        let reference = &order.payment_reference;
        let reason = format!("fulfillment_failed: {reason}");
        let update = StatusUpdate::new(OrderStatusType::Failed)
            .only_from(&[OrderStatusType::Processing])
            .with_failure_reason(reason.clone());
        match self.db.transition_order(reference, update).await? {
            TransitionResult::Applied(order) => {
                warn!("🎁️ Fulfillment of order [{reference}] failed. The order needs manual resolution. {reason}");
                self.call_order_failed_hook(&order, &reason).await;
            },
            TransitionResult::Absorbed(current) => {
                debug!("🎁️ Order [{reference}] is already {}", current.status);
            },
        }
        Ok(())
    }

    async fn current_state(&self, order: Order) -> Result<FulfillmentResult, OrderFlowError> {
        let transaction = self.db.fetch_fulfillment_for_order(order.id).await?;
        Ok(FulfillmentResult { order, transaction })
    }

    async fn call_order_completed_hook(&self, order: &Order, tx: &FulfillmentTransaction) {
        for emitter in &self.producers.order_completed_producer {
            debug!("🎁️ Notifying order completed hook subscribers");
            emitter.publish_event(OrderCompletedEvent::new(order.clone(), tx.clone())).await;
        }
    }

    async fn call_order_failed_hook(&self, order: &Order, reason: &str) {
        for emitter in &self.producers.order_failed_producer {
            emitter.publish_event(OrderFailedEvent::new(order.clone(), reason)).await;
        }
    }
}

/// The value of the order in the currency its cart was priced in.
fn face_value(order: &Order) -> (MinorUnits, String) {
    let amount = order.metadata.subtotal.unwrap_or(order.amount);
    let currency = order.metadata.cart_currency.clone().unwrap_or_else(|| order.currency.clone());
    (amount, currency)
}
