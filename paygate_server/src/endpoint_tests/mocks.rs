use mockall::mock;
use paygate_engine::{
    pge_api::exchange_objects::ExchangeRate,
    traits::{ExchangeRateError, ExchangeRates},
};

mock! {
    pub RateSource {}
    impl ExchangeRates for RateSource {
        async fn fetch_last_rate(&self, base: &str, quote: &str) -> Result<ExchangeRate, ExchangeRateError>;
        async fn set_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), ExchangeRateError>;
    }
}

/// A rate source that only knows `USD/GHS = 15.5`.
pub fn usd_ghs_rates() -> MockRateSource {
    let mut rates = MockRateSource::new();
    rates.expect_fetch_last_rate().returning(|base, quote| match (base, quote) {
        ("USD", "GHS") => Ok(ExchangeRate::new(base.to_string(), quote.to_string(), 15_500_000, None)),
        _ => Err(ExchangeRateError::RateDoesNotExist(format!("{base}/{quote}"))),
    });
    rates
}
