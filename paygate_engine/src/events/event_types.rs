use serde::Serialize;

use crate::db_types::{FulfillmentTransaction, Order};

/// Published once per order, by whichever caller applied the `pending → paid` transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
    pub fulfillment: FulfillmentTransaction,
}

impl OrderCompletedEvent {
    pub fn new(order: Order, fulfillment: FulfillmentTransaction) -> Self {
        Self { order, fulfillment }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderFailedEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderFailedEvent {
    pub fn new<S: Into<String>>(order: Order, reason: S) -> Self {
        Self { order, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderCompleted(OrderCompletedEvent),
    OrderFailed(OrderFailedEvent),
}
