use std::fmt::Display;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use paygate_common::MinorUnits;

const PPM: i128 = 1_000_000;

#[derive(Debug, Clone, FromRow)]
pub struct ExchangeRate {
    pub base_currency: String,
    pub quote_currency: String,
    /// Minor units of the quote currency per minor unit of the base currency, in parts per million
    pub rate: i64,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRate {
    /// Create a new ExchangeRate object
    ///
    /// *NB* The rate is in parts per million, i.e. a rate of `15_500_000` means 1 unit of `base` buys 15.5 units of
    /// `quote`.
    pub fn new(base: String, quote: String, rate_ppm: i64, updated_at: Option<DateTime<Utc>>) -> Self {
        let updated_at = updated_at.unwrap_or_else(Utc::now);
        Self { base_currency: base, quote_currency: quote, rate: rate_ppm, updated_at }
    }

    /// Create a new ExchangeRate object with a 1:1 rate
    pub fn parity(base: String, quote: String) -> Self {
        Self::new(base, quote, 1_000_000, None)
    }

    /// Convert an amount in base currency minor units to quote currency minor units, rounding half-up.
    ///
    /// Returns `None` if the converted amount does not fit in [`MinorUnits`].
    pub fn convert(&self, amount: MinorUnits) -> Option<MinorUnits> {
        let scaled = i128::from(amount.value()) * i128::from(self.rate);
        let rounded = if scaled >= 0 { (scaled + PPM / 2) / PPM } else { (scaled - PPM / 2) / PPM };
        i64::try_from(rounded).ok().map(MinorUnits::from)
    }
}

impl Display for ExchangeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.rate / 1_000_000;
        let frac = self.rate % 1_000_000;
        write!(f, "1 {} => {whole}.{frac:06} {}", self.base_currency, self.quote_currency)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exchange_rate() {
        let rate = ExchangeRate::parity("GHS".to_string(), "GHS".to_string());
        assert_eq!(rate.convert(MinorUnits::from(1998)), Some(MinorUnits::from(1998)));
        assert_eq!(format!("{rate}"), "1 GHS => 1.000000 GHS");

        // 1 USD = 15.5 GHS
        let rate = ExchangeRate::new("USD".to_string(), "GHS".to_string(), 15_500_000, None);
        assert_eq!(rate.convert(MinorUnits::from(999)), Some(MinorUnits::from(15_485)));
        assert_eq!(rate.convert(MinorUnits::from(i64::MAX / 4)), None);
        assert_eq!(format!("{rate}"), "1 USD => 15.500000 GHS");

        // Rounds half-up: 3 * 0.5 = 1.5 -> 2
        let rate = ExchangeRate::new("NGN".to_string(), "GHS".to_string(), 500_000, None);
        assert_eq!(rate.convert(MinorUnits::from(3)), Some(MinorUnits::from(2)));
        assert_eq!(rate.convert(MinorUnits::from(2)), Some(MinorUnits::from(1)));
    }
}
