#![allow(dead_code)]
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use paygate_engine::{
    db_types::{FulfillmentStatus, MinorUnits, PaymentMethod, PaymentReference},
    helpers::RetryPolicy,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{
        CollectionProvider,
        CollectionRequest,
        FulfillmentOutcome,
        FulfillmentProvider,
        FulfillmentRequest,
        FulfillmentUpdate,
        PaymentConfirmation,
        PaymentOutcome,
        ProviderError,
        ProviderHandle,
        WebhookError,
    },
    SqliteDatabase,
};
use serde::Deserialize;

pub const GOOD_SIGNATURE: &str = "valid-signature";

pub async fn new_database() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_delays(Duration::ZERO, Duration::ZERO)
        .with_attempt_timeout(Duration::from_millis(100))
        .with_max_attempts(3)
}

#[derive(Deserialize)]
struct MockWebhook {
    reference: String,
    status: PaymentOutcome,
    amount: Option<i64>,
    currency: Option<String>,
    transaction_id: Option<String>,
}

pub fn webhook_body(reference: &str, status: &str, amount: i64, currency: &str) -> Vec<u8> {
    format!(
        r#"{{"reference":"{reference}","status":"{status}","amount":{amount},"currency":"{currency}","transaction_id":"tx-{reference}"}}"#
    )
    .into_bytes()
}

/// A collection provider that accepts every request and reports whatever verdict it has been told to.
#[derive(Clone)]
pub struct MockCollector {
    pub currency: String,
    pub verify_enabled: bool,
    pub reject_initiate: bool,
    pub verdict: Arc<Mutex<PaymentOutcome>>,
    pub initiate_calls: Arc<AtomicU32>,
    pub verify_calls: Arc<AtomicU32>,
}

impl MockCollector {
    pub fn new(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            verify_enabled: true,
            reject_initiate: false,
            verdict: Arc::new(Mutex::new(PaymentOutcome::Pending)),
            initiate_calls: Arc::new(AtomicU32::new(0)),
            verify_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn set_verdict(&self, outcome: PaymentOutcome) {
        *self.verdict.lock().unwrap() = outcome;
    }
}

impl CollectionProvider for MockCollector {
    fn provider_name(&self) -> &str {
        "mock-collector"
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    fn signature_header(&self) -> &str {
        "x-mock-signature"
    }

    fn supports_verify(&self) -> bool {
        self.verify_enabled
    }

    async fn initiate(&self, request: &CollectionRequest) -> Result<ProviderHandle, ProviderError> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_initiate {
            return Ok(ProviderHandle::rejected("invalid phone number"));
        }
        Ok(ProviderHandle::accepted().with_provider_reference(format!("mock-{}", request.reference)))
    }

    async fn verify(&self, reference: &PaymentReference) -> Result<PaymentConfirmation, ProviderError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = *self.verdict.lock().unwrap();
        Ok(PaymentConfirmation::new(reference.clone(), outcome).with_transaction_id(format!("tx-{reference}")))
    }

    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<PaymentConfirmation, WebhookError> {
        if signature != Some(GOOD_SIGNATURE) {
            return Err(WebhookError::Signature("signature mismatch".into()));
        }
        let hook: MockWebhook = serde_json::from_slice(body).map_err(|e| WebhookError::Payload(e.to_string()))?;
        let mut confirmation = PaymentConfirmation::new(hook.reference.into(), hook.status)
            .with_raw(String::from_utf8_lossy(body).to_string());
        if let (Some(amount), Some(currency)) = (hook.amount, hook.currency) {
            confirmation = confirmation.with_amount(MinorUnits::from(amount), currency);
        }
        if let Some(tx) = hook.transaction_id {
            confirmation = confirmation.with_transaction_id(tx);
        }
        Ok(confirmation)
    }
}

pub fn collectors(collector: MockCollector) -> paygate_engine::traits::CollectionProviders<MockCollector> {
    paygate_engine::traits::CollectionProviders::new().with_provider(PaymentMethod::MobileMoney, collector)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FulfillerBehaviour {
    Succeed,
    Pending,
    Decline,
    Hang,
}

/// A prepaid fulfillment provider with scripted behaviour.
#[derive(Clone)]
pub struct MockFulfiller {
    pub behaviour: Arc<Mutex<FulfillerBehaviour>>,
    pub verify_status: Arc<Mutex<FulfillmentStatus>>,
    pub initiate_calls: Arc<AtomicU32>,
    pub requests: Arc<Mutex<Vec<FulfillmentRequest>>>,
}

impl MockFulfiller {
    pub fn new(behaviour: FulfillerBehaviour) -> Self {
        Self {
            behaviour: Arc::new(Mutex::new(behaviour)),
            verify_status: Arc::new(Mutex::new(FulfillmentStatus::Pending)),
            initiate_calls: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> u32 {
        self.initiate_calls.load(Ordering::SeqCst)
    }
}

impl FulfillmentProvider for MockFulfiller {
    fn provider_name(&self) -> &str {
        "mock-fulfiller"
    }

    fn signature_header(&self) -> &str {
        "x-mock-signature"
    }

    async fn initiate(&self, request: &FulfillmentRequest) -> Result<FulfillmentOutcome, ProviderError> {
        let n = self.initiate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        let behaviour = *self.behaviour.lock().unwrap();
        let status = match behaviour {
            FulfillerBehaviour::Succeed => FulfillmentStatus::Successful,
            FulfillerBehaviour::Pending => FulfillmentStatus::Pending,
            FulfillerBehaviour::Decline => FulfillmentStatus::Failed,
            FulfillerBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(10)).await;
                FulfillmentStatus::Pending
            },
        };
        Ok(FulfillmentOutcome {
            external_id: format!("ext-{}-{n}", request.order_reference),
            status,
            amount: request.amount,
            recipient: request.recipient.clone(),
            metadata: serde_json::json!({ "operator": "MTN" }),
        })
    }

    async fn verify(&self, external_id: &str) -> Result<FulfillmentOutcome, ProviderError> {
        let status = *self.verify_status.lock().unwrap();
        Ok(FulfillmentOutcome {
            external_id: external_id.to_string(),
            status,
            amount: MinorUnits::from(0),
            recipient: String::new(),
            metadata: serde_json::Value::Null,
        })
    }

    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<FulfillmentUpdate, WebhookError> {
        if signature != Some(GOOD_SIGNATURE) {
            return Err(WebhookError::Signature("signature mismatch".into()));
        }
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| WebhookError::Payload(e.to_string()))?;
        let external_id = value["id"].as_str().ok_or_else(|| WebhookError::Payload("missing id".into()))?;
        let status = match value["status"].as_str() {
            Some("SUCCESSFUL") => FulfillmentStatus::Successful,
            Some("FAILED") => FulfillmentStatus::Failed,
            _ => FulfillmentStatus::Pending,
        };
        let reason = value["reason"].as_str().map(String::from);
        Ok(FulfillmentUpdate { external_id: external_id.to_string(), status, reason })
    }
}
