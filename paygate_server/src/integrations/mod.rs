pub mod fulfillment;
pub mod notifications;
