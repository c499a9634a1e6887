//! Prepaid fulfillment: airtime top-ups and digital gift cards.
//!
//! The provider authenticates with OAuth client credentials. Top-ups and gift cards live behind different API
//! audiences, so each audience has its own cached bearer token.
//!
//! External ids are namespaced by product, e.g. `topup:1234` or `giftcard:987`, so that `verify` knows which API to
//! ask.
use std::time::Duration;

use log::*;
use paygate_engine::{
    db_types::{FulfillmentStatus, MinorUnits, ProductType},
    traits::{
        FulfillmentOutcome,
        FulfillmentProvider,
        FulfillmentRequest,
        FulfillmentUpdate,
        ProviderError,
        WebhookError,
        WebhookVerifier,
    },
};
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::payload_error,
    helpers::{dial_code, normalize_msisdn},
    HmacAlgorithm,
    HmacVerifier,
    PrepaidConfig,
    ProviderApiError,
    RestClient,
    SignatureEncoding,
    TokenCache,
};

pub const PREPAID_SIGNATURE_HEADER: &str = "x-prepaid-signature";
const TOPUP_PREFIX: &str = "topup";
const GIFTCARD_PREFIX: &str = "giftcard";

#[derive(Clone)]
pub struct PrepaidProvider {
    config: PrepaidConfig,
    client: RestClient,
    tokens: TokenCache,
    verifier: HmacVerifier,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    audience: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecipientPhone {
    country_code: String,
    number: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopupRequest {
    operator_id: i64,
    amount: String,
    use_local_amount: bool,
    custom_identifier: String,
    recipient_phone: RecipientPhone,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operator {
    id: i64,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopupTransaction {
    transaction_id: i64,
    status: Option<String>,
    operator_name: Option<String>,
    delivered_amount: Option<f64>,
    delivered_amount_currency_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopupStatus {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GiftCardOrder {
    product_id: i64,
    quantity: u32,
    unit_price: String,
    custom_identifier: String,
    recipient_email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GiftCardTransaction {
    transaction_id: i64,
    status: String,
    #[serde(default)]
    product: Option<GiftCardProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GiftCardProduct {
    product_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusEvent {
    #[serde(rename = "type")]
    kind: String,
    data: StatusEventData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusEventData {
    transaction_id: i64,
    status: String,
    error_message: Option<String>,
}

fn status_for(status: &str) -> FulfillmentStatus {
    match status.to_ascii_uppercase().as_str() {
        "SUCCESSFUL" => FulfillmentStatus::Successful,
        "FAILED" | "REFUNDED" => FulfillmentStatus::Failed,
        _ => FulfillmentStatus::Pending,
    }
}

impl PrepaidProvider {
    pub fn new(config: PrepaidConfig, timeout: Duration) -> Result<Self, ProviderApiError> {
        let client = RestClient::new("", None, timeout)?;
        let verifier = HmacVerifier::new(config.webhook_secret.clone(), HmacAlgorithm::Sha256, SignatureEncoding::Hex);
        Ok(Self { config, client, tokens: TokenCache::default(), verifier })
    }

    pub fn with_token_cache(mut self, tokens: TokenCache) -> Self {
        self.tokens = tokens;
        self
    }

    async fn access_token(&self, audience: &str) -> Result<String, ProviderApiError> {
        self.tokens
            .get_token(audience, || async {
                let body = TokenRequest {
                    client_id: self.config.client_id.reveal(),
                    client_secret: self.config.client_secret.reveal(),
                    grant_type: "client_credentials",
                    audience,
                };
                let token = self
                    .client
                    .rest_query::<TokenResponse, _>(Method::POST, &self.config.auth_url, None, Some(&body))
                    .await
                    .map_err(|e| if e.is_transient() { e } else { ProviderApiError::TokenError(e.to_string()) })?;
                Ok::<_, ProviderApiError>((token.access_token, Duration::from_secs(token.expires_in)))
            })
            .await
    }

    /// Sends an authenticated request to `audience`. A 401 drops the cached token and is reported as transient, so
    /// that a retry fetches a fresh one.
    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        audience: &str,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, ProviderError> {
        let token = self.access_token(audience).await?;
        let url = format!("{}{path}", audience.trim_end_matches('/'));
        match self.client.rest_query(method, &url, Some(&token), body).await {
            Err(ProviderApiError::QueryError { status: 401, message }) => {
                warn!("🔑️ Access token for {audience} was refused. {message}");
                self.tokens.invalidate(audience).await;
                Err(ProviderError::Transient("access token was refused".into()))
            },
            result => Ok(result?),
        }
    }

    async fn operator_for(&self, msisdn: &str, country_code: &str) -> Result<Operator, ProviderError> {
        let path = format!("/operators/auto-detect/phone/{msisdn}/countries/{country_code}");
        let operator = self.send::<Operator, ()>(&self.config.topup_url, Method::GET, &path, None).await?;
        debug!("🎁️ {msisdn} belongs to operator {} ({})", operator.id, operator.name.as_deref().unwrap_or("unknown"));
        Ok(operator)
    }

    async fn top_up(&self, request: &FulfillmentRequest) -> Result<FulfillmentOutcome, ProviderError> {
        let country_code = self.config.country_code.to_ascii_uppercase();
        let dial = dial_code(&country_code)
            .ok_or_else(|| ProviderError::Validation(format!("Top-ups are not supported in {country_code}")))?;
        let msisdn = normalize_msisdn(&request.recipient, dial)
            .ok_or_else(|| ProviderError::Validation(format!("{} is not a phone number", request.recipient)))?;
        let operator_id = match request.product_id.as_deref().and_then(|id| id.parse::<i64>().ok()) {
            Some(id) => id,
            None => self.operator_for(&msisdn, &country_code).await?.id,
        };
        let body = TopupRequest {
            operator_id,
            amount: request.amount.to_string(),
            use_local_amount: true,
            custom_identifier: request.order_reference.to_string(),
            recipient_phone: RecipientPhone { country_code, number: msisdn.clone() },
        };
        info!("🎁️ Topping up {msisdn} with {} {} for {}", request.amount, request.currency, request.order_reference);
        let tx = self.send::<TopupTransaction, _>(&self.config.topup_url, Method::POST, "/topups", Some(&body)).await?;
        Ok(FulfillmentOutcome {
            external_id: format!("{TOPUP_PREFIX}:{}", tx.transaction_id),
            status: tx.status.as_deref().map(status_for).unwrap_or(FulfillmentStatus::Successful),
            amount: request.amount,
            recipient: msisdn,
            metadata: json!({
                "operator": tx.operator_name,
                "delivered_amount": tx.delivered_amount,
                "delivered_currency": tx.delivered_amount_currency_code,
            }),
        })
    }

    async fn order_gift_card(&self, request: &FulfillmentRequest) -> Result<FulfillmentOutcome, ProviderError> {
        if !request.recipient.contains('@') {
            return Err(ProviderError::Validation(format!("{} is not an e-mail address", request.recipient)));
        }
        let product_id = request
            .product_id
            .as_deref()
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| ProviderError::Validation("Gift card orders need a numeric product id".into()))?;
        let body = GiftCardOrder {
            product_id,
            quantity: 1,
            unit_price: request.amount.to_string(),
            custom_identifier: request.order_reference.to_string(),
            recipient_email: request.recipient.clone(),
        };
        info!("🎁️ Ordering gift card {product_id} for {}", request.order_reference);
        let tx =
            self.send::<GiftCardTransaction, _>(&self.config.giftcard_url, Method::POST, "/orders", Some(&body)).await?;
        Ok(FulfillmentOutcome {
            external_id: format!("{GIFTCARD_PREFIX}:{}", tx.transaction_id),
            status: status_for(&tx.status),
            amount: request.amount,
            recipient: request.recipient.clone(),
            metadata: json!({ "product": tx.product.and_then(|p| p.product_name) }),
        })
    }
}

impl FulfillmentProvider for PrepaidProvider {
    fn provider_name(&self) -> &str {
        "prepaid"
    }

    fn signature_header(&self) -> &str {
        PREPAID_SIGNATURE_HEADER
    }

    async fn initiate(&self, request: &FulfillmentRequest) -> Result<FulfillmentOutcome, ProviderError> {
        match request.product_type {
            ProductType::Airtime => self.top_up(request).await,
            ProductType::GiftCard => self.order_gift_card(request).await,
            ProductType::Goods => Err(ProviderError::Validation("Goods are not fulfilled by this provider".into())),
        }
    }

    async fn verify(&self, external_id: &str) -> Result<FulfillmentOutcome, ProviderError> {
        let status = match external_id.split_once(':') {
            Some((TOPUP_PREFIX, id)) => {
                let path = format!("/topups/{id}/status");
                self.send::<TopupStatus, ()>(&self.config.topup_url, Method::GET, &path, None).await?.status
            },
            Some((GIFTCARD_PREFIX, id)) => {
                let path = format!("/orders/transactions/{id}");
                self.send::<GiftCardTransaction, ()>(&self.config.giftcard_url, Method::GET, &path, None).await?.status
            },
            _ => return Err(ProviderError::Validation(format!("Unrecognised transaction id {external_id}"))),
        };
        trace!("🎁️ Transaction {external_id} is {status}");
        Ok(FulfillmentOutcome {
            external_id: external_id.to_string(),
            status: status_for(&status),
            amount: MinorUnits::default(),
            recipient: String::default(),
            metadata: serde_json::Value::Null,
        })
    }

    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<FulfillmentUpdate, WebhookError> {
        self.verifier.verify(body, signature)?;
        let event: StatusEvent = serde_json::from_slice(body).map_err(payload_error)?;
        let prefix = match event.kind.as_str() {
            "airtime_transaction.status" => TOPUP_PREFIX,
            "giftcard_transaction.status" => GIFTCARD_PREFIX,
            other => return Err(WebhookError::Payload(format!("Unexpected event type {other}"))),
        };
        Ok(FulfillmentUpdate {
            external_id: format!("{prefix}:{}", event.data.transaction_id),
            status: status_for(&event.data.status),
            reason: event.data.error_message,
        })
    }
}

#[cfg(test)]
mod test {
    use paygate_common::Secret;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn provider(server: &MockServer) -> PrepaidProvider {
        let config = PrepaidConfig {
            auth_url: format!("{}/oauth/token", server.uri()),
            topup_url: format!("{}/topups-api", server.uri()),
            giftcard_url: format!("{}/giftcards-api", server.uri()),
            client_id: Secret::new("client".into()),
            client_secret: Secret::new("shh".into()),
            webhook_secret: Secret::new("prepaid-hook-secret".into()),
            country_code: "GH".into(),
        };
        PrepaidProvider::new(config, Duration::from_secs(5)).unwrap()
    }

    async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_partial_json(json!({ "grant_type": "client_credentials" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": token, "expires_in": 3600 })),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn airtime(reference: &str, product_id: Option<&str>) -> FulfillmentRequest {
        FulfillmentRequest {
            order_reference: reference.into(),
            product_type: ProductType::Airtime,
            product_id: product_id.map(String::from),
            recipient: "024 123 4567".into(),
            amount: MinorUnits::from(1000),
            currency: "GHS".into(),
        }
    }

    #[tokio::test]
    async fn airtime_top_up_reuses_token() {
        let _ = env_logger::try_init();
        let server = MockServer::start().await;
        mount_token(&server, "tok-1", 1).await;
        Mock::given(method("POST"))
            .and(path("/topups-api/topups"))
            .and(header("Authorization", "Bearer tok-1"))
            .and(body_partial_json(json!({
                "operatorId": 643,
                "amount": "10.00",
                "useLocalAmount": true,
                "recipientPhone": { "countryCode": "GH", "number": "233241234567" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transactionId": 4401,
                "status": "SUCCESSFUL",
                "operatorName": "MTN Ghana",
                "deliveredAmount": 10.0,
                "deliveredAmountCurrencyCode": "GHS"
            })))
            .expect(2)
            .mount(&server)
            .await;
        let p = provider(&server);
        let first = p.initiate(&airtime("AIR-1", Some("643"))).await.unwrap();
        assert_eq!(first.external_id, "topup:4401");
        assert_eq!(first.status, FulfillmentStatus::Successful);
        assert_eq!(first.metadata["operator"], "MTN Ghana");
        let second = p.initiate(&airtime("AIR-2", Some("643"))).await.unwrap();
        assert_eq!(second.recipient, "233241234567");
    }

    #[tokio::test]
    async fn providers_can_share_a_token_cache() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-shared", 1).await;
        Mock::given(method("GET"))
            .and(path("/topups-api/topups/88/status"))
            .and(header("Authorization", "Bearer tok-shared"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "PENDING" })))
            .expect(2)
            .mount(&server)
            .await;
        let tokens = TokenCache::default();
        let a = provider(&server).with_token_cache(tokens.clone());
        let b = provider(&server).with_token_cache(tokens);
        assert_eq!(a.verify("topup:88").await.unwrap().status, FulfillmentStatus::Pending);
        assert_eq!(b.verify("topup:88").await.unwrap().status, FulfillmentStatus::Pending);
    }

    #[tokio::test]
    async fn operator_is_detected_when_not_given() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-1", 1).await;
        Mock::given(method("GET"))
            .and(path("/topups-api/operators/auto-detect/phone/233241234567/countries/GH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 150, "name": "MTN Ghana" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/topups-api/topups"))
            .and(body_partial_json(json!({ "operatorId": 150 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "transactionId": 77, "status": "PENDING" })))
            .expect(1)
            .mount(&server)
            .await;
        let outcome = provider(&server).initiate(&airtime("AIR-3", None)).await.unwrap();
        assert_eq!(outcome.external_id, "topup:77");
        assert_eq!(outcome.status, FulfillmentStatus::Pending);
    }

    #[tokio::test]
    async fn refused_token_is_dropped() {
        let server = MockServer::start().await;
        mount_token(&server, "stale", 2).await;
        Mock::given(method("POST"))
            .and(path("/topups-api/topups"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;
        let p = provider(&server);
        let err = p.initiate(&airtime("AIR-4", Some("643"))).await.unwrap_err();
        assert!(err.is_transient());
        // the next attempt asks for a new token
        let err = p.initiate(&airtime("AIR-4", Some("643"))).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn gift_cards_need_email_and_product() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-gc", 1).await;
        Mock::given(method("POST"))
            .and(path("/giftcards-api/orders"))
            .and(body_partial_json(json!({ "productId": 12, "unitPrice": "25.00", "recipientEmail": "a@b.co" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transactionId": 9001,
                "status": "SUCCESSFUL",
                "product": { "productName": "Steam Wallet" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let p = provider(&server);
        let mut request = FulfillmentRequest {
            order_reference: "GFT-1".into(),
            product_type: ProductType::GiftCard,
            product_id: Some("12".into()),
            recipient: "a@b.co".into(),
            amount: MinorUnits::from(2500),
            currency: "USD".into(),
        };
        let outcome = p.initiate(&request).await.unwrap();
        assert_eq!(outcome.external_id, "giftcard:9001");
        assert_eq!(outcome.metadata["product"], "Steam Wallet");

        request.recipient = "0241234567".into();
        assert!(matches!(p.initiate(&request).await, Err(ProviderError::Validation(_))));
        request.recipient = "a@b.co".into();
        request.product_id = None;
        assert!(matches!(p.initiate(&request).await, Err(ProviderError::Validation(_))));
        request.product_type = ProductType::Goods;
        assert!(matches!(p.initiate(&request).await, Err(ProviderError::Validation(_))));
    }

    #[tokio::test]
    async fn verify_uses_the_right_api() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 2).await;
        Mock::given(method("GET"))
            .and(path("/topups-api/topups/4401/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "REFUNDED" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/giftcards-api/orders/transactions/9001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "transactionId": 9001, "status": "SUCCESSFUL" })))
            .mount(&server)
            .await;
        let p = provider(&server);
        assert_eq!(p.verify("topup:4401").await.unwrap().status, FulfillmentStatus::Failed);
        assert_eq!(p.verify("giftcard:9001").await.unwrap().status, FulfillmentStatus::Successful);
        assert!(matches!(p.verify("4401").await, Err(ProviderError::Validation(_))));
    }

    #[tokio::test]
    async fn webhook_updates_are_signed() {
        let server = MockServer::start().await;
        let p = provider(&server);
        let body = json!({
            "type": "airtime_transaction.status",
            "data": { "transactionId": 4401, "status": "FAILED", "errorMessage": "Operator unavailable" }
        })
        .to_string();
        let signer =
            HmacVerifier::new(Secret::new("prepaid-hook-secret".into()), HmacAlgorithm::Sha256, SignatureEncoding::Hex);
        let sig = signer.sign(body.as_bytes());
        let update = p.build_webhook_event(body.as_bytes(), Some(&sig)).unwrap();
        assert_eq!(update.external_id, "topup:4401");
        assert_eq!(update.status, FulfillmentStatus::Failed);
        assert_eq!(update.reason.as_deref(), Some("Operator unavailable"));

        let mut tampered = body.clone().into_bytes();
        tampered[10] ^= 0x01;
        assert!(matches!(p.build_webhook_event(&tampered, Some(&sig)), Err(WebhookError::Signature(_))));
    }
}
