use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use log::error;
pub use paygate_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// The reconciliation state of an order.
///
/// ```text
///  pending ──► paid ──► processing ──► completed
///     │         │           │
///     └─────────┴───────────┴──────► failed
/// ```
///
/// `completed` and `failed` are terminal. Any notification that would move a terminal order is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order row exists but the collection confirmation has not been applied yet.
    Pending,
    /// The collection provider confirmed the payment.
    Paid,
    /// A fulfillment request has been dispatched for the order.
    Processing,
    /// Fulfillment succeeded. Goods orders never reach this state and remain `Paid`.
    Completed,
    /// The payment was rejected, or fulfillment failed after payment.
    Failed,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The states from which `self` can be entered.
    pub fn allowed_predecessors(&self) -> &'static [OrderStatusType] {
        use OrderStatusType::*;
        match self {
            Pending => &[],
            Paid => &[Pending],
            Processing => &[Paid],
            Completed => &[Processing],
            Failed => &[Pending, Paid, Processing],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        next.allowed_predecessors().contains(self)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "pending"),
            OrderStatusType::Paid => write!(f, "paid"),
            OrderStatusType::Processing => write!(f, "processing"),
            OrderStatusType::Completed => write!(f, "completed"),
            OrderStatusType::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------     ProductType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    #[default]
    Goods,
    Airtime,
    GiftCard,
}

impl ProductType {
    /// Airtime and gift cards are dispatched by the prepaid fulfillment provider once paid for.
    pub fn requires_fulfillment(&self) -> bool {
        !matches!(self, Self::Goods)
    }

    pub fn reference_prefix(&self) -> &'static str {
        match self {
            ProductType::Goods => "ORD",
            ProductType::Airtime => "AIR",
            ProductType::GiftCard => "GFT",
        }
    }
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::Goods => write!(f, "goods"),
            ProductType::Airtime => write!(f, "airtime"),
            ProductType::GiftCard => write!(f, "gift_card"),
        }
    }
}

//--------------------------------------    PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileMoney,
    Card,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::MobileMoney => write!(f, "mobile_money"),
            PaymentMethod::Card => write!(f, "card"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "mobile_money" | "momo" => Ok(Self::MobileMoney),
            "card" | "bank" => Ok(Self::Card),
            s => Err(ConversionError(format!("Unsupported payment method: {s}"))),
        }
    }
}

//--------------------------------------   PaymentReference    ---------------------------------------------------------
/// The idempotency key that ties a payment session, the provider's records and the order row together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct PaymentReference(pub String);

impl PaymentReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PaymentReference {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for PaymentReference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PaymentReference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for PaymentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------         Cart         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: MinorUnits,
    pub quantity: i64,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub product_type: ProductType,
}

impl CartItem {
    pub fn new<S: Into<String>>(product_id: S, name: S, unit_price: MinorUnits, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity,
            image_ref: None,
            product_type: ProductType::Goods,
        }
    }

    pub fn with_product_type(mut self, product_type: ProductType) -> Self {
        self.product_type = product_type;
        self
    }

    pub fn with_image_ref<S: Into<String>>(mut self, image_ref: S) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// `unit_price × quantity`, or `None` if that overflows.
    pub fn line_total(&self) -> Option<MinorUnits> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: String,
    pub currency: String,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new<S: Into<String>>(user_id: S, currency: S) -> Self {
        Self { user_id: user_id.into(), currency: currency.into(), items: Vec::new(), updated_at: Utc::now() }
    }

    pub fn with_item(mut self, item: CartItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|i| i.quantity <= 0)
    }

    /// Σ `unit_price × quantity` over all lines. Returns `None` if the total cannot be represented.
    pub fn total(&self) -> Option<MinorUnits> {
        self.items.iter().try_fold(MinorUnits::default(), |total, item| total.checked_add(item.line_total()?))
    }

    /// The product type of the whole cart. Returns `None` if the cart mixes a fulfillable product type with anything
    /// else, since a single fulfillment call cannot serve it.
    pub fn product_type(&self) -> Option<ProductType> {
        let mut types = self.items.iter().map(|i| i.product_type);
        let first = types.next().unwrap_or_default();
        let mixed = self.items.iter().any(|i| i.product_type != first);
        match (mixed, self.items.iter().any(|i| i.product_type.requires_fulfillment())) {
            (true, true) => None,
            (true, false) => Some(ProductType::Goods),
            (false, _) => Some(first),
        }
    }
}

//--------------------------------------    PaymentSession    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: PaymentReference,
    pub user_id: String,
    /// Key of the cart this session was created from. Carts are keyed by user id.
    pub cart_ref: String,
    /// The amount to collect, in the collection currency
    pub amount: MinorUnits,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub product_type: ProductType,
    /// The cart total in the cart currency, before any conversion
    pub subtotal: MinorUnits,
    pub cart_currency: String,
    /// Conversion rate, in parts per million, if the cart was priced in another currency
    pub exchange_rate: Option<i64>,
    pub recipient: Option<String>,
    /// The cart lines as they were priced at checkout
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }
}

/// Everything the session store needs to open a session. The store assigns the id unless one is provided.
#[derive(Debug, Clone)]
pub struct NewPaymentSession {
    pub reference: Option<PaymentReference>,
    pub user_id: String,
    pub cart_ref: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub product_type: ProductType,
    pub subtotal: MinorUnits,
    pub cart_currency: String,
    pub exchange_rate: Option<i64>,
    pub recipient: Option<String>,
    pub items: Vec<CartItem>,
}

impl NewPaymentSession {
    /// A session for a cart priced in the collection currency. Returns `None` if the cart total overflows.
    pub fn for_cart(cart: &Cart, payment_method: PaymentMethod, product_type: ProductType) -> Option<Self> {
        let total = cart.total()?;
        Some(Self {
            reference: None,
            user_id: cart.user_id.clone(),
            cart_ref: cart.user_id.clone(),
            amount: total,
            currency: cart.currency.clone(),
            payment_method,
            product_type,
            subtotal: total,
            cart_currency: cart.currency.clone(),
            exchange_rate: None,
            recipient: None,
            items: cart.items.iter().filter(|i| i.quantity > 0).cloned().collect(),
        })
    }

    pub fn with_reference<R: Into<PaymentReference>>(mut self, reference: R) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_recipient<S: Into<String>>(mut self, recipient: S) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_conversion(mut self, amount: MinorUnits, currency: &str, rate_ppm: i64) -> Self {
        self.amount = amount;
        self.currency = currency.to_string();
        self.exchange_rate = Some(rate_ppm);
        self
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<MinorUnits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub payment_reference: PaymentReference,
    pub transaction_id: Option<String>,
    pub product_type: ProductType,
    pub exchange_rate: Option<i64>,
    pub metadata: Json<OrderMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_reference: PaymentReference,
    pub transaction_id: Option<String>,
    pub product_type: ProductType,
    pub exchange_rate: Option<i64>,
    pub metadata: OrderMetadata,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Builds the order that a confirmed payment session materializes into. The items are the cart lines priced at
    /// checkout, so the order always matches what the customer was charged for.
    pub fn from_session(session: &PaymentSession) -> Self {
        let items = session.items.iter().map(NewOrderItem::from).collect();
        let metadata = OrderMetadata {
            subtotal: Some(session.subtotal),
            cart_currency: Some(session.cart_currency.clone()),
            recipient: session.recipient.clone(),
            failure_reason: None,
        };
        Self {
            user_id: session.user_id.clone(),
            amount: session.amount,
            currency: session.currency.clone(),
            payment_method: session.payment_method,
            payment_reference: session.id.clone(),
            transaction_id: None,
            product_type: session.product_type,
            exchange_rate: session.exchange_rate,
            metadata,
            items,
        }
    }

    pub fn with_transaction_id(mut self, transaction_id: Option<String>) -> Self {
        self.transaction_id = transaction_id;
        self
    }
}

//--------------------------------------      OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub price_at_time: MinorUnits,
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub price_at_time: MinorUnits,
    pub image_ref: Option<String>,
}

impl From<&CartItem> for NewOrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            price_at_time: item.unit_price,
            image_ref: item.image_ref.clone(),
        }
    }
}

//--------------------------------------   OrderStatusChange   --------------------------------------------------------
/// A row of the `order_status_history` audit table, written by a trigger on every status change.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderStatusChange {
    pub id: i64,
    pub order_id: i64,
    pub old_status: Option<OrderStatusType>,
    pub new_status: OrderStatusType,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  FulfillmentStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Successful,
    Failed,
}

impl Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FulfillmentStatus::Pending => write!(f, "pending"),
            FulfillmentStatus::Successful => write!(f, "successful"),
            FulfillmentStatus::Failed => write!(f, "failed"),
        }
    }
}

//-------------------------------------- FulfillmentTransaction -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct FulfillmentTransaction {
    pub id: i64,
    pub external_id: String,
    pub order_id: i64,
    pub status: FulfillmentStatus,
    pub amount: MinorUnits,
    pub recipient: String,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFulfillmentTransaction {
    pub external_id: String,
    pub status: FulfillmentStatus,
    pub amount: MinorUnits,
    pub recipient: String,
    pub metadata: serde_json::Value,
}

//--------------------------------------    OrphanedPayment    --------------------------------------------------------
/// A verified payment notification for which neither a live session nor an order exists.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrphanedPayment {
    pub id: i64,
    pub payment_reference: PaymentReference,
    pub provider: String,
    pub status: String,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrphanedPayment {
    pub payment_reference: PaymentReference,
    pub provider: String,
    pub status: String,
    pub amount: Option<MinorUnits>,
    pub currency: Option<String>,
    pub payload: String,
}
