use paygate_engine::{
    db_types::PaymentReference,
    traits::{CollectionProvider, CollectionRequest, PaymentConfirmation, ProviderError, ProviderHandle, WebhookError},
};

use crate::{CardProvider, MobileMoneyProvider};

/// The collection providers the server can be configured with, behind one concrete type so that they can share a
/// [`paygate_engine::traits::CollectionProviders`] registry.
#[derive(Clone)]
pub enum CollectionAdapter {
    MobileMoney(MobileMoneyProvider),
    Card(CardProvider),
}

impl From<MobileMoneyProvider> for CollectionAdapter {
    fn from(p: MobileMoneyProvider) -> Self {
        Self::MobileMoney(p)
    }
}

impl From<CardProvider> for CollectionAdapter {
    fn from(p: CardProvider) -> Self {
        Self::Card(p)
    }
}

impl CollectionProvider for CollectionAdapter {
    fn provider_name(&self) -> &str {
        match self {
            Self::MobileMoney(p) => p.provider_name(),
            Self::Card(p) => p.provider_name(),
        }
    }

    fn currency(&self) -> &str {
        match self {
            Self::MobileMoney(p) => p.currency(),
            Self::Card(p) => p.currency(),
        }
    }

    fn signature_header(&self) -> &str {
        match self {
            Self::MobileMoney(p) => p.signature_header(),
            Self::Card(p) => p.signature_header(),
        }
    }

    fn supports_verify(&self) -> bool {
        match self {
            Self::MobileMoney(p) => p.supports_verify(),
            Self::Card(p) => p.supports_verify(),
        }
    }

    async fn initiate(&self, request: &CollectionRequest) -> Result<ProviderHandle, ProviderError> {
        match self {
            Self::MobileMoney(p) => p.initiate(request).await,
            Self::Card(p) => p.initiate(request).await,
        }
    }

    async fn verify(&self, reference: &PaymentReference) -> Result<PaymentConfirmation, ProviderError> {
        match self {
            Self::MobileMoney(p) => p.verify(reference).await,
            Self::Card(p) => p.verify(reference).await,
        }
    }

    fn build_webhook_event(&self, body: &[u8], signature: Option<&str>) -> Result<PaymentConfirmation, WebhookError> {
        match self {
            Self::MobileMoney(p) => p.build_webhook_event(body, signature),
            Self::Card(p) => p.build_webhook_event(body, signature),
        }
    }
}
