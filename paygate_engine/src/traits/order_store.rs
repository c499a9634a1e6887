use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{
        FulfillmentStatus,
        FulfillmentTransaction,
        NewFulfillmentTransaction,
        NewOrder,
        NewOrphanedPayment,
        Order,
        OrderItem,
        OrderStatusChange,
        OrphanedPayment,
        PaymentReference,
    },
    traits::data_objects::{InsertOrderResult, StatusUpdate, TransitionResult},
};

/// This trait defines the durable storage behaviour that the order-flow and fulfillment APIs depend on.
///
/// This behaviour includes:
/// * Idempotent order materialization keyed on the payment reference
/// * Compare-and-set status transitions that honour the order state machine
/// * Recording fulfillment transactions, atomically with the status change they cause
/// * Recording orphaned payments for manual reconciliation
#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Takes a new order, and in a single atomic transaction, stores the order and all its items.
    ///
    /// This call is idempotent. If an order with the same payment reference already exists (including one inserted by
    /// a concurrent caller that won the race on the unique constraint), the existing order is returned as
    /// [`InsertOrderResult::AlreadyExists`] and nothing is written.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, OrderStoreError>;

    /// Fetches the order for the given payment reference, if it exists.
    async fn fetch_order_by_reference(&self, reference: &PaymentReference) -> Result<Option<Order>, OrderStoreError>;

    /// Fetches the line items of an order.
    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderStoreError>;

    /// Applies a status change as a compare-and-set.
    ///
    /// The order is only updated if its current status is one of `update.new_status.allowed_predecessors()`. Exactly
    /// one of any number of concurrent callers observes [`TransitionResult::Applied`]; the rest observe
    /// [`TransitionResult::Absorbed`] with the current state of the order.
    ///
    /// If a transaction id or failure reason is given, it is written in the same statement.
    ///
    /// Returns [`OrderStoreError::OrderNotFound`] if no order exists for the reference.
    async fn transition_order(
        &self,
        reference: &PaymentReference,
        update: StatusUpdate,
    ) -> Result<TransitionResult, OrderStoreError>;

    /// Records the result of a fulfillment call for the order.
    ///
    /// In a single atomic transaction:
    /// * The fulfillment transaction is inserted. At most one transaction may exist per order; a second insert fails
    ///   with [`OrderStoreError::FulfillmentAlreadyRecorded`].
    /// * If the transaction status is `Successful`, the order moves from `processing` to `completed`.
    ///
    /// Returns the stored transaction and the order as it stands after the call.
    async fn record_fulfillment(
        &self,
        reference: &PaymentReference,
        transaction: NewFulfillmentTransaction,
    ) -> Result<(FulfillmentTransaction, TransitionResult), OrderStoreError>;

    /// Updates the status of a previously recorded (pending) fulfillment transaction, and in the same transaction
    /// moves the order to `completed` or `failed` accordingly.
    ///
    /// Returns `None` if no transaction exists with the given external id.
    async fn resolve_fulfillment(
        &self,
        external_id: &str,
        status: FulfillmentStatus,
        reason: Option<String>,
    ) -> Result<Option<(FulfillmentTransaction, TransitionResult)>, OrderStoreError>;

    /// Fetches the fulfillment transaction for an order, if one was recorded.
    async fn fetch_fulfillment_for_order(&self, order_id: i64)
        -> Result<Option<FulfillmentTransaction>, OrderStoreError>;

    /// Fetches orders that have been in `processing` for longer than `older_than`, together with their fulfillment
    /// transaction (if any).
    async fn fetch_stale_processing_orders(
        &self,
        older_than: Duration,
    ) -> Result<Vec<(Order, Option<FulfillmentTransaction>)>, OrderStoreError>;

    /// Returns the status history of an order, oldest first.
    async fn fetch_status_history(&self, order_id: i64) -> Result<Vec<OrderStatusChange>, OrderStoreError>;

    /// Records a verified payment notification that could not be matched to a session or an order. Duplicate
    /// notifications (same reference, provider and status) are stored once. Returns `None` for a duplicate.
    async fn record_orphaned_payment(
        &self,
        payment: NewOrphanedPayment,
    ) -> Result<Option<OrphanedPayment>, OrderStoreError>;

    /// Fetches orphaned payments recorded for the given reference.
    async fn fetch_orphaned_payments(
        &self,
        reference: &PaymentReference,
    ) -> Result<Vec<OrphanedPayment>, OrderStoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(PaymentReference),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("An order for payment reference {0} was inserted concurrently")]
    IdempotencyConflict(PaymentReference),
    #[error("A fulfillment transaction has already been recorded for order #{0}")]
    FulfillmentAlreadyRecorded(i64),
    #[error("An order must contain at least one item")]
    EmptyOrder,
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        OrderStoreError::DatabaseError(e.to_string())
    }
}
