use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{FulfillmentStatus, FulfillmentTransaction, NewFulfillmentTransaction},
    traits::OrderStoreError,
};

/// Inserts the fulfillment transaction for an order. The table allows one transaction per order, so a second insert
/// for the same order fails with [`OrderStoreError::FulfillmentAlreadyRecorded`].
pub async fn insert_transaction(
    order_id: i64,
    tx: &NewFulfillmentTransaction,
    conn: &mut SqliteConnection,
) -> Result<FulfillmentTransaction, OrderStoreError> {
    let result = sqlx::query_as(
        r#"
        INSERT INTO fulfillment_transactions (external_id, order_id, status, amount, recipient, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *;
        "#,
    )
    .bind(&tx.external_id)
    .bind(order_id)
    .bind(tx.status.to_string())
    .bind(tx.amount.value())
    .bind(&tx.recipient)
    .bind(Json(&tx.metadata))
    .fetch_one(conn)
    .await;
    match result {
        Ok(row) => {
            debug!("🗃️ Fulfillment transaction {} recorded for order #{order_id}", tx.external_id);
            Ok(row)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(OrderStoreError::FulfillmentAlreadyRecorded(order_id))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTransaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM fulfillment_transactions WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

pub async fn fetch_by_external_id(
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTransaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM fulfillment_transactions WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

/// Moves a pending transaction to its final status. Returns `None` if the transaction is not pending anymore.
pub async fn resolve_pending(
    external_id: &str,
    status: FulfillmentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTransaction>, sqlx::Error> {
    let tx = sqlx::query_as(
        "UPDATE fulfillment_transactions SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE external_id = $2 AND \
         status = 'pending' RETURNING *",
    )
    .bind(status.to_string())
    .bind(external_id)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}
