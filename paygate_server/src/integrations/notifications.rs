//! Terminal order events.
//!
//! There is no downstream system to notify yet, so terminal outcomes are written to the log where operators can
//! pick up failed orders for manual follow-up.
use futures::future::BoxFuture;
use log::*;
use paygate_engine::events::{EventHandlers, EventHooks, OrderCompletedEvent, OrderFailedEvent};

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 50;

pub fn create_notification_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_completed(|ev: OrderCompletedEvent| {
        info!(
            "📬️ Order [{}] for {} is complete. {} delivered to {} ({})",
            ev.order.payment_reference,
            ev.order.user_id,
            ev.fulfillment.amount,
            ev.fulfillment.recipient,
            ev.fulfillment.external_id
        );
        no_op()
    });
    hooks.on_order_failed(|ev: OrderFailedEvent| {
        warn!(
            "📬️ Order [{}] for {} failed: {}. {} {} was collected with {}; follow up manually.",
            ev.order.payment_reference,
            ev.order.user_id,
            ev.reason,
            ev.order.amount,
            ev.order.currency,
            ev.order.payment_method
        );
        no_op()
    });
    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
