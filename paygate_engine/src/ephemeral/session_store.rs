use std::{
    future::ready,
    time::{Duration, Instant},
};

use chrono::Utc;
use log::*;
use moka::{
    future::Cache,
    ops::compute::{CompResult, Op},
    Expiry,
};

use crate::{
    db_types::{NewPaymentSession, PaymentReference, PaymentSession},
    helpers::new_payment_reference,
    traits::{PaymentSessionStore, SessionStoreError},
};

const DEFAULT_MAX_SESSIONS: u64 = 100_000;

/// Evicts each session at its own `expires_at`.
struct SessionExpiry;

impl Expiry<PaymentReference, PaymentSession> for SessionExpiry {
    fn expire_after_create(
        &self,
        _key: &PaymentReference,
        value: &PaymentSession,
        _created_at: Instant,
    ) -> Option<Duration> {
        let remaining = (value.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Some(remaining)
    }
}

/// Payment sessions keyed by reference, with an index of the live session for each cart.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Cache<PaymentReference, PaymentSession>,
    by_cart: Cache<String, PaymentReference>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

impl MemorySessionStore {
    pub fn new(max_sessions: u64) -> Self {
        let sessions = Cache::builder().max_capacity(max_sessions).expire_after(SessionExpiry).build();
        let by_cart = Cache::builder().max_capacity(max_sessions).build();
        Self { sessions, by_cart }
    }

    /// Points the cart's index entry at `id` and closes the session it pointed at before, if any.
    async fn supersede(&self, cart_ref: &str, id: &PaymentReference) {
        let mut previous = None;
        self.by_cart
            .entry(cart_ref.to_string())
            .and_compute_with(|maybe_entry| {
                previous = maybe_entry.map(|e| e.into_value()).filter(|prev| prev != id);
                ready(Op::Put(id.clone()))
            })
            .await;
        if let Some(old) = previous {
            if self.sessions.remove(&old).await.is_some_and(|s| !s.is_expired()) {
                info!("💳️ Payment session {old} for cart {cart_ref} closed. It is superseded by {id}");
            }
        }
    }

    /// Drops the cart's index entry, unless a newer session has taken it over.
    async fn release(&self, cart_ref: &str, id: &PaymentReference) {
        self.by_cart
            .entry(cart_ref.to_string())
            .and_compute_with(|maybe_entry| {
                let op = match maybe_entry {
                    Some(entry) if entry.value() == id => Op::Remove,
                    _ => Op::Nop,
                };
                ready(op)
            })
            .await;
    }
}

impl PaymentSessionStore for MemorySessionStore {
    async fn create(&self, session: NewPaymentSession, ttl: Duration) -> Result<PaymentSession, SessionStoreError> {
        let id = session.reference.clone().unwrap_or_else(|| new_payment_reference(session.product_type));
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let new_session = PaymentSession {
            id: id.clone(),
            user_id: session.user_id,
            cart_ref: session.cart_ref,
            amount: session.amount,
            currency: session.currency,
            payment_method: session.payment_method,
            product_type: session.product_type,
            subtotal: session.subtotal,
            cart_currency: session.cart_currency,
            exchange_rate: session.exchange_rate,
            recipient: session.recipient,
            items: session.items,
            created_at,
            expires_at: created_at + ttl,
        };
        let result = self
            .sessions
            .entry(id.clone())
            .and_compute_with(|maybe_entry| {
                let op = match maybe_entry {
                    Some(existing) if !existing.value().is_expired() => Op::Nop,
                    _ => Op::Put(new_session),
                };
                ready(op)
            })
            .await;
        let session = match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => entry.into_value(),
            _ => return Err(SessionStoreError::AlreadyExists(id)),
        };
        self.supersede(&session.cart_ref, &id).await;
        debug!("💳️ Payment session {id} opened for {} {}", session.amount, session.currency);
        Ok(session)
    }

    async fn get(&self, id: &PaymentReference) -> Option<PaymentSession> {
        self.sessions.get(id).await.filter(|s| !s.is_expired())
    }

    async fn live_session_for_cart(&self, cart_ref: &str) -> Option<PaymentSession> {
        let id = self.by_cart.get(cart_ref).await?;
        self.get(&id).await
    }

    async fn consume(&self, id: &PaymentReference) -> Result<PaymentSession, SessionStoreError> {
        let session = self.sessions.remove(id).await;
        if let Some(s) = &session {
            self.release(&s.cart_ref, id).await;
        }
        match session {
            Some(session) if !session.is_expired() => {
                debug!("💳️ Payment session {id} consumed");
                Ok(session)
            },
            _ => Err(SessionStoreError::NotFound(id.clone())),
        }
    }
}
