//! `SqliteDatabase` is a concrete implementation of a payment gateway engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the durable storage traits defined in the
//! [`crate::traits`] module.
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sqlx::SqlitePool;

use super::db::{exchange_rates, fulfillment, new_pool, order_items, orders, orphans};
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
        OrderStatusType,
        OrphanedPayment,
        PaymentReference,
    },
    pge_api::exchange_objects::ExchangeRate,
    traits::{
        ExchangeRateError,
        ExchangeRates,
        InsertOrderResult,
        OrderStore,
        OrderStoreError,
        StatusUpdate,
        TransitionResult,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }
}

fn status_for_fulfillment(status: FulfillmentStatus) -> Option<OrderStatusType> {
    match status {
        FulfillmentStatus::Pending => None,
        FulfillmentStatus::Successful => Some(OrderStatusType::Completed),
        FulfillmentStatus::Failed => Some(OrderStatusType::Failed),
    }
}

impl OrderStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Takes a new order, and in a single atomic transaction, stores the order and its items.
    ///
    /// The existence check up front is an optimisation only. The `ON CONFLICT` clause on the unique payment reference
    /// is what decides the race: the loser gets no row back (or a unique violation, if its transaction started before
    /// the winner committed), rolls back, and re-reads the winner's order.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, OrderStoreError> {
        if order.items.is_empty() {
            return Err(OrderStoreError::EmptyOrder);
        }
        let reference = order.payment_reference.clone();
        {
            let mut conn = self.pool.acquire().await?;
            if let Some(existing) = orders::fetch_order_by_reference(&reference, &mut conn).await? {
                debug!("🗃️ Order [{reference}] already exists with id {}", existing.id);
                return Ok(InsertOrderResult::AlreadyExists(existing));
            }
        }
        let mut tx = self.pool.begin().await?;
        let inserted = match orders::insert_order(&order, &mut tx).await {
            Ok(inserted) => inserted,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => None,
            Err(e) => return Err(e.into()),
        };
        match inserted {
            Some(new_order) => {
                let items = order_items::insert_items(new_order.id, &order.items, &mut tx).await?;
                tx.commit().await?;
                debug!("🗃️ Order [{reference}] saved with id {} and {} items", new_order.id, items.len());
                Ok(InsertOrderResult::Inserted(new_order))
            },
            None => {
                tx.rollback().await?;
                debug!("🗃️ Order [{reference}] was inserted concurrently. Returning the existing order.");
                let existing = self
                    .fetch_order_by_reference(&reference)
                    .await?
                    .ok_or(OrderStoreError::IdempotencyConflict(reference))?;
                Ok(InsertOrderResult::AlreadyExists(existing))
            },
        }
    }

    async fn fetch_order_by_reference(&self, reference: &PaymentReference) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_reference(reference, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let items = order_items::fetch_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn transition_order(
        &self,
        reference: &PaymentReference,
        update: StatusUpdate,
    ) -> Result<TransitionResult, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        match orders::transition_order(reference, &update, &mut conn).await? {
            Some(order) => Ok(TransitionResult::Applied(order)),
            None => {
                let current = orders::fetch_order_by_reference(reference, &mut conn)
                    .await?
                    .ok_or_else(|| OrderStoreError::OrderNotFound(reference.clone()))?;
                trace!(
                    "🗃️ Order [{reference}] is {}. Transition to {} absorbed.",
                    current.status,
                    update.new_status
                );
                Ok(TransitionResult::Absorbed(current))
            },
        }
    }

    async fn record_fulfillment(
        &self,
        reference: &PaymentReference,
        transaction: NewFulfillmentTransaction,
    ) -> Result<(FulfillmentTransaction, TransitionResult), OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_by_reference(reference, &mut tx)
            .await?
            .ok_or_else(|| OrderStoreError::OrderNotFound(reference.clone()))?;
        let stored = fulfillment::insert_transaction(order.id, &transaction, &mut tx).await?;
        let result = match status_for_fulfillment(transaction.status) {
            Some(new_status) => {
                let note = format!("fulfillment {} {}", transaction.external_id, transaction.status);
                let update = StatusUpdate::new(new_status).with_note(note);
                match orders::transition_order(reference, &update, &mut tx).await? {
                    Some(updated) => TransitionResult::Applied(updated),
                    None => TransitionResult::Absorbed(order),
                }
            },
            None => TransitionResult::Absorbed(order),
        };
        tx.commit().await?;
        debug!("🗃️ Fulfillment {} for order [{reference}] is {}", stored.external_id, stored.status);
        Ok((stored, result))
    }

    async fn resolve_fulfillment(
        &self,
        external_id: &str,
        status: FulfillmentStatus,
        reason: Option<String>,
    ) -> Result<Option<(FulfillmentTransaction, TransitionResult)>, OrderStoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(existing) = fulfillment::fetch_by_external_id(external_id, &mut tx).await? else {
            return Ok(None);
        };
        let order = orders::fetch_order_by_id(existing.order_id, &mut tx)
            .await?
            .ok_or(OrderStoreError::OrderIdNotFound(existing.order_id))?;
        let Some(new_status) = status_for_fulfillment(status) else {
            return Ok(Some((existing, TransitionResult::Absorbed(order))));
        };
        let Some(resolved) = fulfillment::resolve_pending(external_id, status, &mut tx).await? else {
            trace!("🗃️ Fulfillment {external_id} is already {}. Update to {status} absorbed.", existing.status);
            return Ok(Some((existing, TransitionResult::Absorbed(order))));
        };
        let mut update = StatusUpdate::new(new_status).with_note(format!("fulfillment {external_id} {status}"));
        if let (FulfillmentStatus::Failed, Some(reason)) = (status, reason) {
            update = update.with_failure_reason(reason);
        }
        let result = match orders::transition_order(&order.payment_reference, &update, &mut tx).await? {
            Some(updated) => TransitionResult::Applied(updated),
            None => TransitionResult::Absorbed(order),
        };
        tx.commit().await?;
        Ok(Some((resolved, result)))
    }

    async fn fetch_fulfillment_for_order(
        &self,
        order_id: i64,
    ) -> Result<Option<FulfillmentTransaction>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let tx = fulfillment::fetch_for_order(order_id, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_stale_processing_orders(
        &self,
        older_than: Duration,
    ) -> Result<Vec<(Order, Option<FulfillmentTransaction>)>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let stale = orders::fetch_orders_older_than(OrderStatusType::Processing, older_than, &mut conn).await?;
        let mut result = Vec::with_capacity(stale.len());
        for order in stale {
            let tx = fulfillment::fetch_for_order(order.id, &mut conn).await?;
            result.push((order, tx));
        }
        Ok(result)
    }

    async fn fetch_status_history(&self, order_id: i64) -> Result<Vec<OrderStatusChange>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let history = orders::fetch_status_history(order_id, &mut conn).await?;
        Ok(history)
    }

    async fn record_orphaned_payment(
        &self,
        payment: NewOrphanedPayment,
    ) -> Result<Option<OrphanedPayment>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let orphan = orphans::insert_orphan(&payment, &mut conn).await?;
        Ok(orphan)
    }

    async fn fetch_orphaned_payments(
        &self,
        reference: &PaymentReference,
    ) -> Result<Vec<OrphanedPayment>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let orphans = orphans::fetch_by_reference(reference, &mut conn).await?;
        Ok(orphans)
    }

    async fn close(&mut self) -> Result<(), OrderStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ExchangeRates for SqliteDatabase {
    async fn fetch_last_rate(&self, base: &str, quote: &str) -> Result<ExchangeRate, ExchangeRateError> {
        let mut conn = self.pool.acquire().await?;
        exchange_rates::fetch_last_rate(base, quote, &mut conn).await
    }

    async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        let mut conn = self.pool.acquire().await?;
        exchange_rates::set_exchange_rate(rate, &mut conn).await
    }
}
