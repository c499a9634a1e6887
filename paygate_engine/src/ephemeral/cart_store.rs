use std::future::ready;

use chrono::Utc;
use log::*;
use moka::{
    future::Cache,
    ops::compute::{CompResult, Op},
};

use crate::{
    db_types::{Cart, CartItem},
    traits::{CartStore, CartStoreError},
};

const DEFAULT_MAX_CARTS: u64 = 100_000;

/// Carts keyed by user id.
///
/// Carts have no time-based expiry. The store holds at most `max_carts` carts; beyond that moka evicts the least
/// recently used ones, so size the bound above the number of concurrently active shoppers (`PAYGATE_MAX_CARTS`).
#[derive(Clone)]
pub struct MemoryCartStore {
    carts: Cache<String, Cart>,
}

impl Default for MemoryCartStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CARTS)
    }
}

impl MemoryCartStore {
    pub fn new(max_carts: u64) -> Self {
        let carts = Cache::builder().max_capacity(max_carts).build();
        Self { carts }
    }
}

impl CartStore for MemoryCartStore {
    async fn get(&self, user_id: &str) -> Option<Cart> {
        self.carts.get(user_id).await
    }

    async fn set(&self, user_id: &str, mut cart: Cart) -> Result<(), CartStoreError> {
        if cart.items.iter().any(|i| i.unit_price.value() < 0) {
            return Err(CartStoreError::Invalid("Unit prices cannot be negative".into()));
        }
        cart.user_id = user_id.to_string();
        cart.items.retain(|i| i.quantity > 0);
        if cart.total().is_none() {
            return Err(total_out_of_range());
        }
        cart.updated_at = Utc::now();
        self.carts.insert(user_id.to_string(), cart).await;
        trace!("🛒️ Cart for {user_id} replaced");
        Ok(())
    }

    async fn delete(&self, user_id: &str) {
        self.carts.invalidate(user_id).await;
        trace!("🛒️ Cart for {user_id} deleted");
    }

    async fn add_item(&self, user_id: &str, currency: &str, item: CartItem) -> Result<Cart, CartStoreError> {
        if item.quantity <= 0 {
            return Err(CartStoreError::Invalid(format!("Quantity must be positive, got {}", item.quantity)));
        }
        if item.unit_price.value() < 0 {
            return Err(CartStoreError::Invalid("Unit prices cannot be negative".into()));
        }
        let owner = user_id.to_string();
        let result = self
            .carts
            .entry(owner.clone())
            .and_compute_with(move |maybe_entry| {
                let mut cart =
                    maybe_entry.map(|e| e.into_value()).unwrap_or_else(|| Cart::new(owner, currency.to_string()));
                let merged = match cart.items.iter_mut().find(|i| i.product_id == item.product_id) {
                    Some(line) => line.quantity.checked_add(item.quantity).map(|q| line.quantity = q).is_some(),
                    None => {
                        cart.items.push(item);
                        true
                    },
                };
                // The existing cart is left untouched if the new line would overflow its total
                let op = if merged && cart.total().is_some() {
                    cart.updated_at = Utc::now();
                    Op::Put(cart)
                } else {
                    Op::Nop
                };
                ready(op)
            })
            .await;
        match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => Ok(entry.into_value()),
            CompResult::Unchanged(_) | CompResult::StillNone(_) => Err(total_out_of_range()),
            CompResult::Removed(_) => Err(CartStoreError::NotFound(user_id.to_string())),
        }
    }

    async fn update_quantity(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<Cart, CartStoreError> {
        let mut overflow = false;
        let result = self
            .carts
            .entry(user_id.to_string())
            .and_compute_with(|maybe_entry| {
                let op = match maybe_entry.map(|e| e.into_value()) {
                    None => Op::Nop,
                    Some(mut cart) => match cart.items.iter().position(|i| i.product_id == product_id) {
                        None => Op::Nop,
                        Some(idx) => {
                            if quantity <= 0 {
                                cart.items.remove(idx);
                            } else {
                                cart.items[idx].quantity = quantity;
                            }
                            if cart.total().is_some() {
                                cart.updated_at = Utc::now();
                                Op::Put(cart)
                            } else {
                                overflow = true;
                                Op::Nop
                            }
                        },
                    },
                };
                ready(op)
            })
            .await;
        match result {
            CompResult::ReplacedWith(entry) | CompResult::Inserted(entry) => {
                debug!("🛒️ Quantity of {product_id} in the cart of {user_id} set to {quantity}");
                Ok(entry.into_value())
            },
            CompResult::Unchanged(_) if overflow => Err(total_out_of_range()),
            CompResult::Unchanged(_) => Err(CartStoreError::ItemNotFound {
                user_id: user_id.to_string(),
                product_id: product_id.to_string(),
            }),
            CompResult::StillNone(_) | CompResult::Removed(_) => Err(CartStoreError::NotFound(user_id.to_string())),
        }
    }
}

fn total_out_of_range() -> CartStoreError {
    CartStoreError::Invalid("The cart total is too large".into())
}
