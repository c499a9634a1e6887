use std::{env, time::Duration};

use log::*;
use paygate_engine::pge_api::exchange_objects::ExchangeRate;
use paygate_providers::{CardConfig, MobileMoneyConfig, PrepaidConfig};

const DEFAULT_PAYGATE_HOST: &str = "127.0.0.1";
const DEFAULT_PAYGATE_PORT: u16 = 8470;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/paygate.db";
const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_CARTS: u64 = 100_000;
const DEFAULT_VERIFY_GRACE_PERIOD: Duration = Duration::from_secs(10);
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_STALE_FULFILLMENT_TIMEOUT: Duration = Duration::from_secs(900);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How long a payment session stays open after checkout.
    pub session_ttl: Duration,
    /// The upper bound on any single call to a provider.
    pub provider_timeout: Duration,
    /// Total number of attempts for a provider call, including the first one.
    pub retry_attempts: u32,
    /// The most carts held in memory at once. The least recently used carts are evicted beyond this.
    pub max_carts: u64,
    /// How long a client poll waits for the provider's webhook before asking the provider directly.
    pub verify_grace_period: Duration,
    pub reconcile_interval: Duration,
    /// Orders that have been `processing` for longer than this are picked up by the reconciliation worker.
    pub stale_fulfillment_timeout: Duration,
    /// Rates written to the database at start-up.
    pub exchange_rates: Vec<ExchangeRate>,
    pub mobile_money: MobileMoneyConfig,
    pub card: CardConfig,
    pub prepaid: PrepaidConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PAYGATE_HOST.to_string(),
            port: DEFAULT_PAYGATE_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            max_carts: DEFAULT_MAX_CARTS,
            verify_grace_period: DEFAULT_VERIFY_GRACE_PERIOD,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            stale_fulfillment_timeout: DEFAULT_STALE_FULFILLMENT_TIMEOUT,
            exchange_rates: Vec::new(),
            mobile_money: MobileMoneyConfig::default(),
            card: CardConfig::default(),
            prepaid: PrepaidConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PAYGATE_HOST").ok().unwrap_or_else(|| DEFAULT_PAYGATE_HOST.into());
        let port = env::var("PAYGATE_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PAYGATE_PORT. {e} Using the default, {DEFAULT_PAYGATE_PORT}, \
                         instead."
                    );
                    DEFAULT_PAYGATE_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PAYGATE_PORT);
        let database_url = env::var("PAYGATE_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ PAYGATE_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let retry_attempts = env::var("PAYGATE_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| {
                s.parse::<u32>()
                    .ok()
                    .filter(|&n| n > 0)
                    .or_else(|| {
                        warn!("🪛️ Invalid configuration value for PAYGATE_RETRY_ATTEMPTS: {s}");
                        None
                    })
            })
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS);
        let max_carts = env::var("PAYGATE_MAX_CARTS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>().ok().filter(|&n| n > 0).or_else(|| {
                    warn!("🪛️ Invalid configuration value for PAYGATE_MAX_CARTS: {s}");
                    None
                })
            })
            .unwrap_or(DEFAULT_MAX_CARTS);
        let exchange_rates = env::var("PAYGATE_EXCHANGE_RATES").map(|s| parse_exchange_rates(&s)).unwrap_or_default();
        Self {
            host,
            port,
            database_url,
            session_ttl: seconds_from_env("PAYGATE_SESSION_TTL", DEFAULT_SESSION_TTL),
            provider_timeout: seconds_from_env("PAYGATE_PROVIDER_TIMEOUT", DEFAULT_PROVIDER_TIMEOUT),
            retry_attempts,
            max_carts,
            verify_grace_period: seconds_from_env("PAYGATE_VERIFY_GRACE_PERIOD", DEFAULT_VERIFY_GRACE_PERIOD),
            reconcile_interval: seconds_from_env("PAYGATE_RECONCILE_INTERVAL", DEFAULT_RECONCILE_INTERVAL),
            stale_fulfillment_timeout: seconds_from_env(
                "PAYGATE_STALE_FULFILLMENT_TIMEOUT",
                DEFAULT_STALE_FULFILLMENT_TIMEOUT,
            ),
            exchange_rates,
            mobile_money: MobileMoneyConfig::new_from_env_or_default(),
            card: CardConfig::new_from_env_or_default(),
            prepaid: PrepaidConfig::new_from_env_or_default(),
        }
    }
}

fn seconds_from_env(key: &str, default: Duration) -> Duration {
    env::var(key)
        .map_err(|_| info!("🪛️ {key} is not set. Using the default value of {} s.", default.as_secs()))
        .and_then(|s| {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| warn!("🪛️ Invalid configuration value for {key}. {e}"))
        })
        .ok()
        .unwrap_or(default)
}

/// Parses `BASE/QUOTE=rate` pairs separated by commas, e.g. `USD/GHS=15.5,NGN/GHS=0.0098`.
///
/// Entries that cannot be read are skipped with a warning.
pub fn parse_exchange_rates(s: &str) -> Vec<ExchangeRate> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let rate = entry.split_once('=').and_then(|(pair, rate)| {
                let (base, quote) = pair.split_once('/')?;
                let ppm = parse_rate_ppm(rate.trim())?;
                Some(ExchangeRate::new(base.trim().to_uppercase(), quote.trim().to_uppercase(), ppm, None))
            });
            if rate.is_none() {
                warn!("🪛️ Ignoring invalid exchange rate ({entry}) in PAYGATE_EXCHANGE_RATES");
            }
            rate
        })
        .collect()
}

/// Reads a positive decimal rate into parts per million, without going through floating point.
fn parse_rate_ppm(rate: &str) -> Option<i64> {
    let (whole, frac) = rate.split_once('.').unwrap_or((rate, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.len() > 6 {
        return None;
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().ok()? };
    let frac = format!("{frac:0<6}").parse::<i64>().ok()?;
    let ppm = whole.checked_mul(1_000_000)?.checked_add(frac)?;
    (ppm > 0).then_some(ppm)
}
