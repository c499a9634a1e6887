use std::fmt::Debug;

use log::*;
use paygate_common::helpers::normalize_currency_code;

use crate::{
    db_types::{Cart, CartItem},
    traits::{CartStore, CartStoreError},
};

/// `CartApi` manages the per-user shopping carts that checkouts are started from.
pub struct CartApi<C> {
    carts: C,
}

impl<C> Debug for CartApi<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

impl<C> CartApi<C>
where C: CartStore
{
    pub fn new(carts: C) -> Self {
        Self { carts }
    }

    pub async fn fetch_cart(&self, user_id: &str) -> Option<Cart> {
        self.carts.get(user_id).await
    }

    pub async fn replace_cart(&self, user_id: &str, mut cart: Cart) -> Result<Cart, CartStoreError> {
        cart.currency = currency_code(&cart.currency)?;
        self.carts.set(user_id, cart).await?;
        self.carts.get(user_id).await.ok_or_else(|| CartStoreError::NotFound(user_id.to_string()))
    }

    pub async fn add_item(&self, user_id: &str, currency: &str, item: CartItem) -> Result<Cart, CartStoreError> {
        let currency = currency_code(currency)?;
        let product_id = item.product_id.clone();
        let cart = self.carts.add_item(user_id, &currency, item).await?;
        debug!("🛒️ {product_id} added to the cart of {user_id}. {} lines, total {:?}", cart.items.len(), cart.total());
        Ok(cart)
    }

    pub async fn update_quantity(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<Cart, CartStoreError> {
        self.carts.update_quantity(user_id, product_id, quantity).await
    }

    pub async fn clear_cart(&self, user_id: &str) {
        self.carts.delete(user_id).await;
        debug!("🛒️ Cart for {user_id} cleared");
    }
}

fn currency_code(code: &str) -> Result<String, CartStoreError> {
    normalize_currency_code(code).ok_or_else(|| CartStoreError::Invalid(format!("{code} is not a currency code")))
}
