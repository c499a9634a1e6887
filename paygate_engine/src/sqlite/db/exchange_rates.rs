use sqlx::SqliteConnection;

use crate::{pge_api::exchange_objects::ExchangeRate, traits::ExchangeRateError};

pub async fn fetch_last_rate(
    base: &str,
    quote: &str,
    conn: &mut SqliteConnection,
) -> Result<ExchangeRate, ExchangeRateError> {
    let result = sqlx::query_as(
        r#"SELECT base_currency, quote_currency, rate, updated_at
        FROM exchange_rates WHERE base_currency = $1 AND quote_currency = $2
        ORDER BY updated_at DESC, id DESC LIMIT 1"#,
    )
    .bind(base)
    .bind(quote)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| ExchangeRateError::RateDoesNotExist(format!("{base}/{quote}")))?;
    Ok(result)
}

pub async fn set_exchange_rate(rate: &ExchangeRate, conn: &mut SqliteConnection) -> Result<(), ExchangeRateError> {
    sqlx::query("INSERT INTO exchange_rates (base_currency, quote_currency, rate, updated_at) VALUES ($1, $2, $3, $4)")
        .bind(&rate.base_currency)
        .bind(&rate.quote_currency)
        .bind(rate.rate)
        .bind(rate.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}
