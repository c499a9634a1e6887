use sqlx::SqliteConnection;

use crate::db_types::{NewOrphanedPayment, OrphanedPayment, PaymentReference};

/// Stores an orphaned payment notification. Duplicates (same reference, provider and status) are ignored and `None`
/// is returned.
pub async fn insert_orphan(
    payment: &NewOrphanedPayment,
    conn: &mut SqliteConnection,
) -> Result<Option<OrphanedPayment>, sqlx::Error> {
    let row = sqlx::query_as(
        r#"
        INSERT INTO orphaned_payments (payment_reference, provider, status, amount, currency, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (payment_reference, provider, status) DO NOTHING
        RETURNING *;
        "#,
    )
    .bind(payment.payment_reference.as_str())
    .bind(&payment.provider)
    .bind(&payment.status)
    .bind(payment.amount.map(|a| a.value()))
    .bind(&payment.currency)
    .bind(&payment.payload)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_by_reference(
    reference: &PaymentReference,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrphanedPayment>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM orphaned_payments WHERE payment_reference = $1 ORDER BY id")
        .bind(reference.as_str())
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
