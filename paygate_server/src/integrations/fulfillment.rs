use std::sync::Arc;

use futures::future::BoxFuture;
use log::*;
use paygate_engine::{
    events::{EventHandlers, EventHooks, OrderPaidEvent},
    FulfillmentApi,
    SqliteDatabase,
};
use paygate_providers::PrepaidProvider;

pub const FULFILLMENT_EVENT_BUFFER_SIZE: usize = 25;

pub type PrepaidFulfillmentApi = FulfillmentApi<SqliteDatabase, PrepaidProvider>;

/// Dispatches prepaid products as soon as their orders are paid.
///
/// Only the `OrderPaid` event is relevant here. Orders for goods, and prepaid orders whose recipient was not given at
/// checkout, are left in `paid` for the client to complete through `POST /api/fulfillment`.
pub fn create_fulfillment_event_handlers(api: Arc<PrepaidFulfillmentApi>) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |ev: OrderPaidEvent| {
        let order = ev.order;
        if !order.product_type.requires_fulfillment() {
            trace!("🎁️ Order [{}] is for {:?}. Nothing to dispatch.", order.payment_reference, order.product_type);
            return no_op();
        }
        let api = Arc::clone(&api);
        Box::pin(async move {
            let reference = order.payment_reference.clone();
            match api.fulfil_paid_order(&order).await {
                Ok(Some(result)) => info!(
                    "🎁️ Order [{reference}] dispatched automatically. Status: {}. Transaction: {}",
                    result.order.status,
                    result.transaction.map(|t| t.external_id).unwrap_or_else(|| "none".to_string())
                ),
                Ok(None) => info!("🎁️ Order [{reference}] has no recipient yet. Waiting for the customer."),
                Err(e) => error!("🎁️ Automatic fulfillment of order [{reference}] failed. {e}"),
            }
        })
    });
    EventHandlers::new(FULFILLMENT_EVENT_BUFFER_SIZE, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
