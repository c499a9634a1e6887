//! The ExchangeRateApi manages the stored conversion rates used when a cart is priced in a different currency from
//! the one the collection provider charges in.

use std::fmt::Debug;

use log::*;

use crate::{
    pge_api::exchange_objects::ExchangeRate,
    traits::{ExchangeRateError, ExchangeRates},
};

pub struct ExchangeRateApi<B> {
    db: B,
}

impl<B> Debug for ExchangeRateApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeRateApi")
    }
}

impl<B> ExchangeRateApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ExchangeRateApi<B>
where B: ExchangeRates
{
    pub async fn fetch_last_rate(&self, base: &str, quote: &str) -> Result<ExchangeRate, ExchangeRateError> {
        if base == quote {
            return Ok(ExchangeRate::parity(base.to_string(), quote.to_string()));
        }
        self.db.fetch_last_rate(base, quote).await
    }

    pub async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError> {
        if rate.rate <= 0 {
            return Err(ExchangeRateError::InvalidRate(format!("{rate}")));
        }
        self.db.set_exchange_rate(rate).await?;
        info!("💱️ Exchange rate updated: {rate}");
        Ok(())
    }
}
