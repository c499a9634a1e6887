use serde::{Deserialize, Serialize};

use crate::{
    db_types::{FulfillmentTransaction, MinorUnits, Order, OrderItem, PaymentReference},
    traits::{CustomerContact, HandleStatus},
};

/// Customer details supplied when a checkout is started.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default, flatten)]
    pub contact: CustomerContact,
    /// Phone number or e-mail that an airtime or gift card order is delivered to
    #[serde(default)]
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    pub session_id: PaymentReference,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: HandleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// What became of a payment confirmation.
#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    /// An order exists for the payment. Its current state is returned.
    Settled(Order),
    /// The provider has not reached a verdict yet.
    Pending,
    /// The provider declined the payment. The session is discarded and the cart is kept so that checkout can be
    /// restarted. If an unpaid order row existed, it is returned in its failed state.
    Rejected { order: Option<Order>, reason: String },
    /// The payment was verified, but neither a session nor an order exists for it. It has been recorded for manual
    /// reconciliation.
    Orphaned,
}

/// A request to dispatch the prepaid product of a paid order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentCommand {
    pub order_reference: PaymentReference,
    #[serde(default)]
    pub recipient: Option<String>,
    /// The face value to deliver, in the currency the cart was priced in. Must match the order if given.
    #[serde(default)]
    pub amount: Option<MinorUnits>,
}

impl FulfillmentCommand {
    pub fn new(order_reference: PaymentReference) -> Self {
        Self { order_reference, recipient: None, amount: None }
    }

    pub fn with_recipient<S: Into<String>>(mut self, recipient: S) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_amount(mut self, amount: MinorUnits) -> Self {
        self.amount = Some(amount);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FulfillmentResult {
    pub order: Order,
    pub transaction: Option<FulfillmentTransaction>,
}

/// An order together with its line items and fulfillment transaction.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub fulfillment: Option<FulfillmentTransaction>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    /// Pending fulfillments that the provider has since resolved
    pub resolved: usize,
    /// Orders failed because their fulfillment was interrupted before anything was recorded
    pub failed: usize,
    /// Fulfillments the provider still reports as pending
    pub still_pending: usize,
}
