use std::env;

use log::*;
use paygate_common::Secret;

const DEFAULT_MOMO_BASE_URL: &str = "https://api.sandbox.pawapay.cloud";
const DEFAULT_CARD_BASE_URL: &str = "https://api.paystack.co";
const DEFAULT_PREPAID_AUTH_URL: &str = "https://auth.reloadly.com/oauth/token";
const DEFAULT_PREPAID_TOPUP_URL: &str = "https://topups-sandbox.reloadly.com";
const DEFAULT_PREPAID_GIFTCARD_URL: &str = "https://giftcards-sandbox.reloadly.com";

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| {
        debug!("🪛️ {key} is not set. Using {default}");
        default.to_string()
    })
}

fn secret_from_env(key: &str) -> Secret<String> {
    let value = env::var(key).unwrap_or_else(|_| {
        warn!("🪛️ {key} is not set. Calls that need it will fail.");
        String::default()
    });
    Secret::new(value)
}

#[derive(Debug, Clone, Default)]
pub struct MobileMoneyConfig {
    pub base_url: String,
    pub api_token: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub currency: String,
    /// ISO 3166 alpha-3 country code, used to pick the network correspondent codes
    pub country: String,
}

impl MobileMoneyConfig {
    pub fn new_from_env_or_default() -> Self {
        Self {
            base_url: env_or_default("PAYGATE_MOMO_BASE_URL", DEFAULT_MOMO_BASE_URL),
            api_token: secret_from_env("PAYGATE_MOMO_API_TOKEN"),
            webhook_secret: secret_from_env("PAYGATE_MOMO_WEBHOOK_SECRET"),
            currency: env_or_default("PAYGATE_MOMO_CURRENCY", "GHS"),
            country: env_or_default("PAYGATE_MOMO_COUNTRY", "GHA"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CardConfig {
    pub base_url: String,
    /// Authenticates API calls and signs webhooks
    pub secret_key: Secret<String>,
    pub currency: String,
    pub callback_url: Option<String>,
}

impl CardConfig {
    pub fn new_from_env_or_default() -> Self {
        Self {
            base_url: env_or_default("PAYGATE_CARD_BASE_URL", DEFAULT_CARD_BASE_URL),
            secret_key: secret_from_env("PAYGATE_CARD_SECRET_KEY"),
            currency: env_or_default("PAYGATE_CARD_CURRENCY", "GHS"),
            callback_url: env::var("PAYGATE_CARD_CALLBACK_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrepaidConfig {
    pub auth_url: String,
    pub topup_url: String,
    pub giftcard_url: String,
    pub client_id: Secret<String>,
    pub client_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    /// ISO 3166 alpha-2 country code of top-up recipients
    pub country_code: String,
}

impl PrepaidConfig {
    pub fn new_from_env_or_default() -> Self {
        Self {
            auth_url: env_or_default("PAYGATE_PREPAID_AUTH_URL", DEFAULT_PREPAID_AUTH_URL),
            topup_url: env_or_default("PAYGATE_PREPAID_TOPUP_URL", DEFAULT_PREPAID_TOPUP_URL),
            giftcard_url: env_or_default("PAYGATE_PREPAID_GIFTCARD_URL", DEFAULT_PREPAID_GIFTCARD_URL),
            client_id: secret_from_env("PAYGATE_PREPAID_CLIENT_ID"),
            client_secret: secret_from_env("PAYGATE_PREPAID_CLIENT_SECRET"),
            webhook_secret: secret_from_env("PAYGATE_PREPAID_WEBHOOK_SECRET"),
            country_code: env_or_default("PAYGATE_PREPAID_COUNTRY_CODE", "GH"),
        }
    }
}
