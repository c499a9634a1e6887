use std::fmt::Display;

use paygate_engine::{
    db_types::{CartItem, FulfillmentStatus, OrderStatusType, PaymentReference},
    order_objects::{ConfirmationOutcome, FulfillmentResult},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceCartRequest {
    pub currency: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddCartItemRequest {
    pub currency: String,
    #[serde(flatten)]
    pub item: CartItem,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub payment_reference: PaymentReference,
}

/// The answer to a client poll.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    pub payment_reference: PaymentReference,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerifyPaymentResponse {
    pub fn from_outcome(reference: PaymentReference, outcome: ConfirmationOutcome) -> Self {
        match outcome {
            ConfirmationOutcome::Settled(order) => {
                let success = matches!(
                    order.status,
                    OrderStatusType::Paid | OrderStatusType::Processing | OrderStatusType::Completed
                );
                Self {
                    success,
                    order_id: Some(order.id),
                    payment_reference: order.payment_reference,
                    status: order.status.to_string(),
                    message: order.metadata.0.failure_reason,
                }
            },
            ConfirmationOutcome::Pending => {
                Self { success: false, order_id: None, payment_reference: reference, status: "pending".into(), message: None }
            },
            ConfirmationOutcome::Rejected { order, reason } => Self {
                success: false,
                order_id: order.map(|o| o.id),
                payment_reference: reference,
                status: OrderStatusType::Failed.to_string(),
                message: Some(reason),
            },
            ConfirmationOutcome::Orphaned => Self {
                success: false,
                order_id: None,
                payment_reference: reference,
                status: "orphaned".into(),
                message: Some("The payment was received after the checkout expired and is under review".into()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResponse {
    pub success: bool,
    pub order_reference: PaymentReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub status: OrderStatusType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_status: Option<FulfillmentStatus>,
}

impl From<FulfillmentResult> for FulfillmentResponse {
    fn from(result: FulfillmentResult) -> Self {
        let FulfillmentResult { order, transaction } = result;
        Self {
            success: matches!(order.status, OrderStatusType::Processing | OrderStatusType::Completed),
            order_reference: order.payment_reference,
            transaction_id: transaction.as_ref().map(|t| t.external_id.clone()),
            status: order.status,
            fulfillment_status: transaction.map(|t| t.status),
        }
    }
}
