//! Mobile-money collection.
//!
//! Deposits are requested from the customer's wallet and confirmed exclusively by callback; the provider offers no
//! status query that we rely on. The payment session id is sent as the `depositId`, which the provider treats as an
//! idempotency key, so retried requests never charge the customer twice.
use std::time::Duration;

use chrono::Utc;
use log::*;
use paygate_common::MinorUnits;
use paygate_engine::{
    db_types::PaymentReference,
    traits::{
        CollectionProvider,
        CollectionRequest,
        PaymentConfirmation,
        PaymentOutcome,
        ProviderError,
        ProviderHandle,
        WebhookError,
        WebhookVerifier,
    },
};
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{
    error::payload_error,
    helpers::{dial_code, normalize_msisdn},
    HmacAlgorithm,
    HmacVerifier,
    MobileMoneyConfig,
    ProviderApiError,
    RestClient,
    SignatureEncoding,
};

pub const MOBILE_MONEY_SIGNATURE_HEADER: &str = "x-momo-signature";
const MAX_STATEMENT_LENGTH: usize = 22;

/// `(network, correspondent suffix, MSISDN pattern)` per supported country.
fn network_table(country: &str) -> Option<&'static [(&'static str, &'static str, &'static str)]> {
    match country.to_ascii_uppercase().as_str() {
        "GHA" => Some(&[
            ("MTN", "MTN_MOMO", r"^233(24|25|53|54|55|59)\d{7}$"),
            ("VODAFONE", "VODAFONE", r"^233(20|50)\d{7}$"),
            ("AIRTELTIGO", "AIRTELTIGO", r"^233(26|27|56|57)\d{7}$"),
        ]),
        "ZMB" => Some(&[
            ("MTN", "MTN_MOMO", r"^260(96|76)\d{7}$"),
            ("AIRTEL", "AIRTEL_OAPI", r"^260(97|77)\d{7}$"),
            ("ZAMTEL", "ZAMTEL", r"^260(95)\d{7}$"),
        ]),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Network {
    name: &'static str,
    correspondent: String,
    pattern: Regex,
}

#[derive(Clone)]
pub struct MobileMoneyProvider {
    config: MobileMoneyConfig,
    client: RestClient,
    verifier: HmacVerifier,
    networks: Vec<Network>,
    dial_code: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequest {
    deposit_id: String,
    amount: String,
    currency: String,
    correspondent: String,
    payer: Payer,
    customer_timestamp: String,
    statement_description: String,
}

#[derive(Debug, Serialize)]
struct Payer {
    #[serde(rename = "type")]
    kind: &'static str,
    address: PayerAddress,
}

#[derive(Debug, Serialize)]
struct PayerAddress {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositResponse {
    deposit_id: String,
    status: String,
    rejection_reason: Option<ProviderReason>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderReason {
    #[serde(alias = "rejectionCode", alias = "failureCode")]
    code: Option<String>,
    #[serde(alias = "rejectionMessage", alias = "failureMessage")]
    message: Option<String>,
}

impl ProviderReason {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (Some(s), None) | (None, Some(s)) => s.clone(),
            (None, None) => "unspecified".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositCallback {
    deposit_id: String,
    status: String,
    requested_amount: Option<String>,
    deposited_amount: Option<String>,
    currency: Option<String>,
    provider_transaction_id: Option<String>,
    failure_reason: Option<ProviderReason>,
}

impl MobileMoneyProvider {
    pub fn new(config: MobileMoneyConfig, timeout: Duration) -> Result<Self, ProviderApiError> {
        let table = network_table(&config.country).ok_or_else(|| {
            ProviderApiError::Initialization(format!("Mobile money is not supported in {}", config.country))
        })?;
        let dial_code = dial_code(&config.country)
            .ok_or_else(|| ProviderApiError::Initialization(format!("Unknown country {}", config.country)))?;
        let country = config.country.to_ascii_uppercase();
        let networks = table
            .iter()
            .map(|&(name, prefix, pattern)| {
                let pattern = Regex::new(pattern).map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
                Ok(Network { name, correspondent: format!("{prefix}_{country}"), pattern })
            })
            .collect::<Result<Vec<_>, ProviderApiError>>()?;
        let client = RestClient::new(&config.base_url, Some(config.api_token.reveal().as_str()), timeout)?;
        let verifier =
            HmacVerifier::new(config.webhook_secret.clone(), HmacAlgorithm::Sha256, SignatureEncoding::Base64);
        Ok(Self { config, client, verifier, networks, dial_code })
    }

    /// Normalizes the payer's number and finds the network it belongs to.
    ///
    /// If the customer named a network, the number must match that network's pattern. Otherwise the network is
    /// inferred from the number prefix.
    fn resolve_payer(&self, phone: &str, network: Option<&str>) -> Result<(String, &Network), ProviderError> {
        let msisdn = normalize_msisdn(phone, self.dial_code)
            .ok_or_else(|| ProviderError::Validation(format!("{phone} is not a phone number")))?;
        let network = match network.map(|n| n.trim().to_ascii_uppercase()) {
            Some(name) => {
                let network = self
                    .networks
                    .iter()
                    .find(|n| n.name == name)
                    .ok_or_else(|| ProviderError::Validation(format!("Unsupported mobile network {name}")))?;
                if !network.pattern.is_match(&msisdn) {
                    return Err(ProviderError::Validation(format!("{phone} is not a valid {name} number")));
                }
                network
            },
            None => self
                .networks
                .iter()
                .find(|n| n.pattern.is_match(&msisdn))
                .ok_or_else(|| ProviderError::Validation(format!("{phone} does not belong to a supported network")))?,
        };
        Ok((msisdn, network))
    }
}

fn outcome_for(status: &str) -> PaymentOutcome {
    match status.to_ascii_uppercase().as_str() {
        "COMPLETED" => PaymentOutcome::Succeeded,
        "FAILED" | "REJECTED" => PaymentOutcome::Failed,
        _ => PaymentOutcome::Pending,
    }
}

impl CollectionProvider for MobileMoneyProvider {
    fn provider_name(&self) -> &str {
        "mobile_money"
    }

    fn currency(&self) -> &str {
        &self.config.currency
    }

    fn signature_header(&self) -> &str {
        MOBILE_MONEY_SIGNATURE_HEADER
    }

    fn supports_verify(&self) -> bool {
        false
    }

    async fn initiate(&self, request: &CollectionRequest) -> Result<ProviderHandle, ProviderError> {
        let phone = request
            .customer
            .phone
            .as_deref()
            .ok_or_else(|| ProviderError::Validation("A phone number is required for mobile money".into()))?;
        let (msisdn, network) = self.resolve_payer(phone, request.customer.network.as_deref())?;
        let deposit = DepositRequest {
            deposit_id: request.reference.to_string(),
            amount: request.amount.to_string(),
            currency: request.currency.clone(),
            correspondent: network.correspondent.clone(),
            payer: Payer { kind: "MSISDN", address: PayerAddress { value: msisdn } },
            customer_timestamp: Utc::now().to_rfc3339(),
            statement_description: request.description.chars().take(MAX_STATEMENT_LENGTH).collect(),
        };
        debug!("💳️ Requesting mobile money deposit {} via {}", deposit.deposit_id, deposit.correspondent);
        let response =
            self.client.rest_query::<DepositResponse, _>(Method::POST, "/deposits", None, Some(&deposit)).await?;
        match response.status.to_ascii_uppercase().as_str() {
            "ACCEPTED" | "DUPLICATE_IGNORED" => {
                Ok(ProviderHandle::accepted().with_provider_reference(response.deposit_id))
            },
            _ => {
                let reason = response.rejection_reason.map(|r| r.describe()).unwrap_or_else(|| response.status);
                info!("💳️ Mobile money deposit {} rejected: {reason}", deposit.deposit_id);
                Ok(ProviderHandle::rejected(reason))
            },
        }
    }

    async fn verify(&self, _reference: &PaymentReference) -> Result<PaymentConfirmation, ProviderError> {
        Err(ProviderError::Unsupported("mobile money payments are confirmed by callback only".into()))
    }

    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<PaymentConfirmation, WebhookError> {
        self.verifier.verify(body, signature)?;
        let callback: DepositCallback = serde_json::from_slice(body).map_err(payload_error)?;
        let outcome = outcome_for(&callback.status);
        let mut confirmation = PaymentConfirmation::new(callback.deposit_id.into(), outcome)
            .with_raw(String::from_utf8_lossy(body).to_string());
        let amount = callback.deposited_amount.or(callback.requested_amount);
        if let (Some(amount), Some(currency)) = (amount, callback.currency) {
            let amount = amount.parse::<MinorUnits>().map_err(payload_error)?;
            confirmation = confirmation.with_amount(amount, currency);
        }
        if let Some(id) = callback.provider_transaction_id {
            confirmation = confirmation.with_transaction_id(id);
        }
        if let Some(reason) = callback.failure_reason {
            confirmation = confirmation.with_reason(reason.describe());
        }
        Ok(confirmation)
    }
}

#[cfg(test)]
mod test {
    use paygate_common::Secret;
    use paygate_engine::traits::CustomerContact;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn config(base_url: &str) -> MobileMoneyConfig {
        MobileMoneyConfig {
            base_url: base_url.to_string(),
            api_token: Secret::new("momo-token".into()),
            webhook_secret: Secret::new("momo-webhook-secret".into()),
            currency: "GHS".into(),
            country: "GHA".into(),
        }
    }

    fn request(phone: &str, network: Option<&str>) -> CollectionRequest {
        CollectionRequest {
            reference: "ORD-abc123".into(),
            amount: MinorUnits::from(1998),
            currency: "GHS".into(),
            customer: CustomerContact {
                phone: Some(phone.into()),
                network: network.map(String::from),
                email: None,
            },
            description: "Order ORD-abc123 from the shop".into(),
        }
    }

    #[test]
    fn phone_numbers_must_match_their_network() {
        let provider = MobileMoneyProvider::new(config("http://localhost"), Duration::from_secs(1)).unwrap();
        let (msisdn, network) = provider.resolve_payer("024 123 4567", Some("mtn")).unwrap();
        assert_eq!(msisdn, "233241234567");
        assert_eq!(network.correspondent, "MTN_MOMO_GHA");

        let (_, network) = provider.resolve_payer("+233201234567", None).unwrap();
        assert_eq!(network.name, "VODAFONE");

        assert!(matches!(provider.resolve_payer("0201234567", Some("MTN")), Err(ProviderError::Validation(_))));
        assert!(matches!(provider.resolve_payer("02412345", Some("MTN")), Err(ProviderError::Validation(_))));
        assert!(matches!(provider.resolve_payer("0311234567", None), Err(ProviderError::Validation(_))));
        assert!(matches!(provider.resolve_payer("0241234567", Some("ORANGE")), Err(ProviderError::Validation(_))));
    }

    #[test]
    fn unsupported_country() {
        let mut cfg = config("http://localhost");
        cfg.country = "FRA".into();
        assert!(MobileMoneyProvider::new(cfg, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn deposit_is_accepted_or_rejected() {
        let _ = env_logger::try_init();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deposits"))
            .and(body_partial_json(json!({
                "depositId": "ORD-abc123",
                "amount": "19.98",
                "correspondent": "MTN_MOMO_GHA",
                "payer": { "type": "MSISDN", "address": { "value": "233241234567" } },
                "statementDescription": "Order ORD-abc123 from "
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "depositId": "ORD-abc123",
                "status": "ACCEPTED",
                "created": "2024-06-01T08:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let provider = MobileMoneyProvider::new(config(&server.uri()), Duration::from_secs(5)).unwrap();
        let handle = provider.initiate(&request("0241234567", Some("MTN"))).await.unwrap();
        assert_eq!(handle.status, paygate_engine::traits::HandleStatus::Accepted);
        assert_eq!(handle.provider_reference.as_deref(), Some("ORD-abc123"));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deposits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "depositId": "ORD-abc123",
                "status": "REJECTED",
                "rejectionReason": { "rejectionCode": "PAYER_LIMIT_REACHED", "rejectionMessage": "Limit reached" }
            })))
            .mount(&server)
            .await;
        let provider = MobileMoneyProvider::new(config(&server.uri()), Duration::from_secs(5)).unwrap();
        let handle = provider.initiate(&request("0241234567", None)).await.unwrap();
        assert_eq!(handle.status, paygate_engine::traits::HandleStatus::Rejected);
        assert_eq!(handle.message.as_deref(), Some("PAYER_LIMIT_REACHED: Limit reached"));
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deposits"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let provider = MobileMoneyProvider::new(config(&server.uri()), Duration::from_secs(5)).unwrap();
        let err = provider.initiate(&request("0241234567", None)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn callbacks_are_verified_then_parsed() {
        let provider = MobileMoneyProvider::new(config("http://localhost"), Duration::from_secs(1)).unwrap();
        let signer = HmacVerifier::new(
            Secret::new("momo-webhook-secret".into()),
            HmacAlgorithm::Sha256,
            SignatureEncoding::Base64,
        );
        let body = json!({
            "depositId": "AIR-123",
            "status": "COMPLETED",
            "requestedAmount": "5.00",
            "depositedAmount": "5.00",
            "currency": "GHS",
            "providerTransactionId": "mtn-998877"
        })
        .to_string();
        let sig = signer.sign(body.as_bytes());
        let confirmation = provider.build_webhook_event(body.as_bytes(), Some(&sig)).unwrap();
        assert_eq!(confirmation.reference.as_str(), "AIR-123");
        assert_eq!(confirmation.outcome, PaymentOutcome::Succeeded);
        assert_eq!(confirmation.amount, Some(MinorUnits::from(500)));
        assert_eq!(confirmation.provider_transaction_id.as_deref(), Some("mtn-998877"));

        let mut tampered = body.clone().into_bytes();
        tampered[15] ^= 0x01;
        let err = provider.build_webhook_event(&tampered, Some(&sig)).unwrap_err();
        assert!(matches!(err, WebhookError::Signature(_)));

        let failed = json!({
            "depositId": "AIR-124",
            "status": "FAILED",
            "failureReason": { "failureCode": "PAYER_NOT_FOUND", "failureMessage": "Unknown wallet" }
        })
        .to_string();
        let sig = signer.sign(failed.as_bytes());
        let confirmation = provider.build_webhook_event(failed.as_bytes(), Some(&sig)).unwrap();
        assert_eq!(confirmation.outcome, PaymentOutcome::Failed);
        assert_eq!(confirmation.reason.as_deref(), Some("PAYER_NOT_FOUND: Unknown wallet"));
    }
}
