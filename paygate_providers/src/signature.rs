//! Webhook signature verification.
//!
//! Providers sign the raw request body with a shared secret and send the MAC in a header. The MAC is recomputed
//! over the exact bytes received and compared in constant time. A missing header is a failure.
use hmac::{Hmac, Mac};
use log::*;
use paygate_common::Secret;
use paygate_engine::traits::{WebhookError, WebhookVerifier};
use sha2::{Sha256, Sha512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

#[derive(Debug, Clone)]
pub struct HmacVerifier {
    secret: Secret<String>,
    algorithm: HmacAlgorithm,
    encoding: SignatureEncoding,
}

impl HmacVerifier {
    pub fn new(secret: Secret<String>, algorithm: HmacAlgorithm, encoding: SignatureEncoding) -> Self {
        Self { secret, algorithm, encoding }
    }

    /// Computes the encoded signature of `body`. Used to sign outgoing test payloads.
    pub fn sign(&self, body: &[u8]) -> String {
        let mac = self.mac(body);
        match self.encoding {
            SignatureEncoding::Hex => hex::encode(mac),
            SignatureEncoding::Base64 => base64::encode(mac),
        }
    }

    fn mac(&self, body: &[u8]) -> Vec<u8> {
        let key = self.secret.reveal().as_bytes();
        match self.algorithm {
            HmacAlgorithm::Sha256 => match Hmac::<Sha256>::new_from_slice(key) {
                Ok(mut mac) => {
                    mac.update(body);
                    mac.finalize().into_bytes().to_vec()
                },
                Err(_) => Vec::new(),
            },
            HmacAlgorithm::Sha512 => match Hmac::<Sha512>::new_from_slice(key) {
                Ok(mut mac) => {
                    mac.update(body);
                    mac.finalize().into_bytes().to_vec()
                },
                Err(_) => Vec::new(),
            },
        }
    }

    fn decode(&self, signature: &str) -> Option<Vec<u8>> {
        let signature = signature.trim();
        match self.encoding {
            SignatureEncoding::Hex => hex::decode(signature.to_ascii_lowercase()).ok(),
            SignatureEncoding::Base64 => base64::decode(signature).ok(),
        }
    }

    fn verify_mac(&self, body: &[u8], expected: &[u8]) -> bool {
        let key = self.secret.reveal().as_bytes();
        match self.algorithm {
            HmacAlgorithm::Sha256 => Hmac::<Sha256>::new_from_slice(key)
                .map(|mut mac| {
                    mac.update(body);
                    mac.verify_slice(expected).is_ok()
                })
                .unwrap_or(false),
            HmacAlgorithm::Sha512 => Hmac::<Sha512>::new_from_slice(key)
                .map(|mut mac| {
                    mac.update(body);
                    mac.verify_slice(expected).is_ok()
                })
                .unwrap_or(false),
        }
    }
}

impl WebhookVerifier for HmacVerifier {
    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        if self.secret.is_empty() {
            warn!("🔐️ No webhook secret is configured. Refusing to trust the notification.");
            return Err(WebhookError::Signature("no webhook secret configured".into()));
        }
        let signature = signature.ok_or_else(|| WebhookError::Signature("signature header is missing".into()))?;
        let expected = self.decode(signature).ok_or_else(|| WebhookError::Signature("malformed signature".into()))?;
        if self.verify_mac(body, &expected) {
            trace!("🔐️ Webhook signature check ✅️");
            Ok(())
        } else {
            Err(WebhookError::Signature("signature mismatch".into()))
        }
    }
}
