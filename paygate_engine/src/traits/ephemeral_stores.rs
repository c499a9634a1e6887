use std::time::Duration;

use thiserror::Error;

use crate::db_types::{Cart, CartItem, NewPaymentSession, PaymentReference, PaymentSession};

#[derive(Debug, Clone, Error)]
pub enum CartStoreError {
    #[error("No cart exists for user {0}")]
    NotFound(String),
    #[error("Product {product_id} is not in the cart of user {user_id}")]
    ItemNotFound { user_id: String, product_id: String },
    #[error("Invalid cart: {0}")]
    Invalid(String),
}

/// Per-user shopping carts.
///
/// Every call is atomic with respect to other calls for the same user. Concurrent writers follow last-writer-wins.
#[allow(async_fn_in_trait)]
pub trait CartStore {
    async fn get(&self, user_id: &str) -> Option<Cart>;

    /// Replaces the user's cart.
    async fn set(&self, user_id: &str, cart: Cart) -> Result<(), CartStoreError>;

    /// Removes the cart. Deleting a cart that does not exist is not an error.
    async fn delete(&self, user_id: &str);

    /// Adds an item to the cart, creating the cart in `currency` if the user does not have one. If the product is
    /// already in the cart, the quantities are added together.
    async fn add_item(&self, user_id: &str, currency: &str, item: CartItem) -> Result<Cart, CartStoreError>;

    /// Sets the quantity of a line. A quantity of zero or less removes the line.
    ///
    /// Returns [`CartStoreError::NotFound`] if the user has no cart.
    async fn update_quantity(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<Cart, CartStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum SessionStoreError {
    #[error("Payment session {0} does not exist or has expired")]
    NotFound(PaymentReference),
    #[error("Payment session {0} already exists")]
    AlreadyExists(PaymentReference),
}

/// Short-lived payment sessions.
///
/// A session is readable until it is consumed or its TTL elapses, whichever comes first. Expired sessions are never
/// returned, even if the backing store has not evicted them yet.
#[allow(async_fn_in_trait)]
pub trait PaymentSessionStore {
    /// Opens a new session. If `session.reference` is empty, the store assigns an unguessable id.
    ///
    /// A cart has at most one live session. Opening a session closes any session still open for the same cart, so a
    /// confirmation that arrives later for the closed session finds no session.
    async fn create(&self, session: NewPaymentSession, ttl: Duration) -> Result<PaymentSession, SessionStoreError>;

    async fn get(&self, id: &PaymentReference) -> Option<PaymentSession>;

    /// The session currently open for the cart, if any.
    async fn live_session_for_cart(&self, cart_ref: &str) -> Option<PaymentSession>;

    /// Atomically removes and returns the session. Only one caller can ever consume a given session.
    async fn consume(&self, id: &PaymentReference) -> Result<PaymentSession, SessionStoreError>;
}
