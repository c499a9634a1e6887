//! Card and bank collection through a hosted checkout page.
//!
//! `initiate` returns the URL the customer is redirected to. The outcome arrives by webhook, and can also be pulled
//! with a server-to-server `verify` call, which the poll path uses as a fallback.
use std::time::Duration;

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
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{
    error::payload_error,
    CardConfig,
    HmacAlgorithm,
    HmacVerifier,
    ProviderApiError,
    RestClient,
    SignatureEncoding,
};

pub const CARD_SIGNATURE_HEADER: &str = "x-card-signature";

#[derive(Clone)]
pub struct CardProvider {
    config: CardConfig,
    client: RestClient,
    verifier: HmacVerifier,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    /// In minor units
    amount: i64,
    currency: &'a str,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Authorization {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    id: Option<i64>,
    reference: String,
    status: String,
    amount: i64,
    currency: String,
    gateway_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: Transaction,
}

impl CardProvider {
    pub fn new(config: CardConfig, timeout: Duration) -> Result<Self, ProviderApiError> {
        let client = RestClient::new(&config.base_url, Some(config.secret_key.reveal().as_str()), timeout)?;
        let verifier = HmacVerifier::new(config.secret_key.clone(), HmacAlgorithm::Sha512, SignatureEncoding::Hex);
        Ok(Self { config, client, verifier })
    }
}

fn outcome_for(status: &str) -> PaymentOutcome {
    match status.to_ascii_lowercase().as_str() {
        "success" => PaymentOutcome::Succeeded,
        "failed" | "reversed" => PaymentOutcome::Failed,
        // abandoned sessions can still be completed by the customer until the payment session expires
        _ => PaymentOutcome::Pending,
    }
}

fn confirmation_from(tx: Transaction, raw: String) -> PaymentConfirmation {
    let outcome = outcome_for(&tx.status);
    let mut confirmation = PaymentConfirmation::new(tx.reference.into(), outcome)
        .with_amount(MinorUnits::from(tx.amount), tx.currency)
        .with_raw(raw);
    if let Some(id) = tx.id {
        confirmation = confirmation.with_transaction_id(id.to_string());
    }
    if outcome == PaymentOutcome::Failed {
        confirmation = confirmation.with_reason(tx.gateway_response.unwrap_or_else(|| tx.status.clone()));
    }
    confirmation
}

impl CollectionProvider for CardProvider {
    fn provider_name(&self) -> &str {
        "card"
    }

    fn currency(&self) -> &str {
        &self.config.currency
    }

    fn signature_header(&self) -> &str {
        CARD_SIGNATURE_HEADER
    }

    async fn initiate(&self, request: &CollectionRequest) -> Result<ProviderHandle, ProviderError> {
        let email = request
            .customer
            .email
            .as_deref()
            .filter(|e| e.contains('@'))
            .ok_or_else(|| ProviderError::Validation("A valid e-mail address is required for card payments".into()))?;
        let body = InitializeRequest {
            email,
            amount: request.amount.value(),
            currency: &request.currency,
            reference: request.reference.as_str(),
            callback_url: self.config.callback_url.as_deref(),
        };
        debug!("💳️ Initializing card checkout {}", request.reference);
        let response = self
            .client
            .rest_query::<Envelope<Authorization>, _>(Method::POST, "/transaction/initialize", None, Some(&body))
            .await?;
        match response.data {
            Some(auth) if response.status => Ok(ProviderHandle::accepted()
                .with_redirect_url(auth.authorization_url)
                .with_provider_reference(auth.reference)),
            _ => {
                info!("💳️ Card checkout {} was refused: {}", request.reference, response.message);
                Ok(ProviderHandle::rejected(response.message))
            },
        }
    }

    async fn verify(&self, reference: &PaymentReference) -> Result<PaymentConfirmation, ProviderError> {
        let path = format!("/transaction/verify/{reference}");
        let response = self.client.rest_query::<serde_json::Value, ()>(Method::GET, &path, None, None).await?;
        let raw = response.to_string();
        let envelope: Envelope<Transaction> =
            serde_json::from_value(response).map_err(|e| ProviderApiError::JsonError(e.to_string()))?;
        let tx = envelope.data.ok_or_else(|| ProviderError::Rejected(envelope.message))?;
        trace!("💳️ Card transaction {reference} is {}", tx.status);
        Ok(confirmation_from(tx, raw))
    }

    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<PaymentConfirmation, WebhookError> {
        self.verifier.verify(body, signature)?;
        let event: WebhookEvent = serde_json::from_slice(body).map_err(payload_error)?;
        trace!("💳️ Card webhook {} for {}", event.event, event.data.reference);
        Ok(confirmation_from(event.data, String::from_utf8_lossy(body).to_string()))
    }
}

#[cfg(test)]
mod test {
    use paygate_common::Secret;
    use paygate_engine::traits::{CustomerContact, HandleStatus};
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn provider(base_url: &str) -> CardProvider {
        let config = CardConfig {
            base_url: base_url.to_string(),
            secret_key: Secret::new("sk_test_123".into()),
            currency: "GHS".into(),
            callback_url: Some("https://shop.example/checkout/done".into()),
        };
        CardProvider::new(config, Duration::from_secs(5)).unwrap()
    }

    fn request(email: Option<&str>) -> CollectionRequest {
        CollectionRequest {
            reference: "ORD-xyz".into(),
            amount: MinorUnits::from(1998),
            currency: "GHS".into(),
            customer: CustomerContact { email: email.map(String::from), ..Default::default() },
            description: "Order ORD-xyz".into(),
        }
    }

    #[tokio::test]
    async fn initiate_returns_redirect() {
        let _ = env_logger::try_init();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("Authorization", "Bearer sk_test_123"))
            .and(body_partial_json(json!({ "email": "a@b.co", "amount": 1998, "reference": "ORD-xyz" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.example/abc",
                    "access_code": "abc",
                    "reference": "ORD-xyz"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let p = provider(&server.uri());
        let handle = p.initiate(&request(Some("a@b.co"))).await.unwrap();
        assert_eq!(handle.status, HandleStatus::Accepted);
        assert_eq!(handle.redirect_url.as_deref(), Some("https://checkout.example/abc"));

        let err = p.initiate(&request(None)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn verify_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/ORD-paid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": { "id": 4099260516_i64, "reference": "ORD-paid", "status": "success", "amount": 1998,
                          "currency": "GHS", "gateway_response": "Approved" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/ORD-declined"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": { "id": 17, "reference": "ORD-declined", "status": "failed", "amount": 1998,
                          "currency": "GHS", "gateway_response": "Insufficient funds" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/ORD-busy"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let p = provider(&server.uri());

        let paid = p.verify(&"ORD-paid".into()).await.unwrap();
        assert_eq!(paid.outcome, PaymentOutcome::Succeeded);
        assert_eq!(paid.amount, Some(MinorUnits::from(1998)));
        assert_eq!(paid.provider_transaction_id.as_deref(), Some("4099260516"));

        let declined = p.verify(&"ORD-declined".into()).await.unwrap();
        assert_eq!(declined.outcome, PaymentOutcome::Failed);
        assert_eq!(declined.reason.as_deref(), Some("Insufficient funds"));

        let err = p.verify(&"ORD-busy".into()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn webhook_signature_is_sha512_hex() {
        let p = provider("http://localhost");
        let body = json!({
            "event": "charge.success",
            "data": { "id": 1, "reference": "ORD-xyz", "status": "success", "amount": 1998, "currency": "GHS" }
        })
        .to_string();
        let signer = HmacVerifier::new(Secret::new("sk_test_123".into()), HmacAlgorithm::Sha512, SignatureEncoding::Hex);
        let sig = signer.sign(body.as_bytes());
        assert_eq!(sig.len(), 128);
        let confirmation = p.build_webhook_event(body.as_bytes(), Some(&sig)).unwrap();
        assert_eq!(confirmation.outcome, PaymentOutcome::Succeeded);
        assert_eq!(confirmation.reference.as_str(), "ORD-xyz");
        assert!(p.build_webhook_event(body.as_bytes(), Some(&sig[1..])).is_err());
        assert!(p.build_webhook_event(body.as_bytes(), None).is_err());
    }
}
