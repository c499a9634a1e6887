use chrono::Duration;
use log::{debug, trace};
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderStatusChange, OrderStatusType, PaymentReference},
    traits::StatusUpdate,
};

/// Inserts a new order row using the given connection. This is not atomic with the insertion of its items. Embed this
/// call inside a transaction and pass `&mut *tx` as the connection argument.
///
/// If an order with the same payment reference already exists, nothing is written and `None` is returned.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                user_id,
                amount,
                currency,
                status,
                payment_method,
                payment_reference,
                transaction_id,
                product_type,
                exchange_rate,
                metadata,
                status_note
            ) VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, 'payment confirmed')
            ON CONFLICT (payment_reference) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(&order.user_id)
    .bind(order.amount.value())
    .bind(&order.currency)
    .bind(order.payment_method.to_string())
    .bind(order.payment_reference.as_str())
    .bind(&order.transaction_id)
    .bind(order.product_type.to_string())
    .bind(order.exchange_rate)
    .bind(Json(&order.metadata))
    .fetch_optional(conn)
    .await?;
    // The DB triggers an automatic status history entry for the order
    Ok(order)
}

/// Returns the order for the corresponding `payment_reference`
pub async fn fetch_order_by_reference(
    reference: &PaymentReference,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE payment_reference = $1")
        .bind(reference.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Compare-and-set status update. The row is only touched if its current status is an allowed predecessor of the
/// new status. Returns `None` if no row was updated, either because the order does not exist, or because it is in
/// a state that cannot move to the requested one.
pub async fn transition_order(
    reference: &PaymentReference,
    update: &StatusUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let predecessors = update.predecessors();
    if predecessors.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP, status = ");
    builder.push_bind(update.new_status.to_string());
    builder.push(", status_note = ");
    builder.push_bind(update.note.clone());
    if let Some(txid) = &update.transaction_id {
        builder.push(", transaction_id = ");
        builder.push_bind(txid.clone());
    }
    if let Some(reason) = &update.failure_reason {
        builder.push(", metadata = json_set(metadata, '$.failure_reason', ");
        builder.push_bind(reason.clone());
        builder.push(")");
    }
    builder.push(" WHERE payment_reference = ");
    builder.push_bind(reference.as_str());
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in &predecessors {
        statuses.push_bind(status.to_string());
    }
    statuses.push_unseparated(") RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    if let Some(o) = &order {
        debug!("📝️ Order [{}] moved to {}", o.payment_reference, o.status);
    }
    Ok(order)
}

/// Fetches orders that have been sitting in `status` for longer than `limit`.
pub async fn fetch_orders_older_than(
    status: OrderStatusType,
    limit: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE status = $1 AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(updated_at)) >= $2 ORDER \
         BY updated_at ASC",
    )
    .bind(status.to_string())
    .bind(limit.num_seconds())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_status_history(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusChange>, sqlx::Error> {
    let history = sqlx::query_as("SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(history)
}
