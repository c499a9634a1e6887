use crate::db_types::{Order, OrderStatusType};

/// The result of inserting an order keyed on its payment reference.
#[derive(Debug, Clone)]
pub enum InsertOrderResult {
    /// This call created the order.
    Inserted(Order),
    /// An order with the same payment reference already existed (possibly created by a concurrent caller) and is
    /// returned unchanged.
    AlreadyExists(Order),
}

impl InsertOrderResult {
    pub fn order(&self) -> &Order {
        match self {
            InsertOrderResult::Inserted(o) | InsertOrderResult::AlreadyExists(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            InsertOrderResult::Inserted(o) | InsertOrderResult::AlreadyExists(o) => o,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOrderResult::Inserted(_))
    }
}

/// The result of a compare-and-set status update.
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// This caller moved the order into the new state. The updated order is returned.
    Applied(Order),
    /// The order was not in an allowed predecessor state (a concurrent caller got there first, or the order is
    /// terminal). The current order is returned unchanged.
    Absorbed(Order),
}

impl TransitionResult {
    pub fn order(&self) -> &Order {
        match self {
            TransitionResult::Applied(o) | TransitionResult::Absorbed(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            TransitionResult::Applied(o) | TransitionResult::Absorbed(o) => o,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionResult::Applied(_))
    }
}

/// A requested status change, with the optional fields that travel with it.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub new_status: OrderStatusType,
    pub note: Option<String>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Narrows the allowed predecessor states further. States outside `new_status.allowed_predecessors()` are
    /// ignored.
    pub only_from: Option<&'static [OrderStatusType]>,
}

impl StatusUpdate {
    pub fn new(new_status: OrderStatusType) -> Self {
        Self { new_status, note: None, transaction_id: None, failure_reason: None, only_from: None }
    }

    pub fn only_from(mut self, states: &'static [OrderStatusType]) -> Self {
        self.only_from = Some(states);
        self
    }

    /// The states this update may be applied from.
    pub fn predecessors(&self) -> Vec<OrderStatusType> {
        let allowed = self.new_status.allowed_predecessors();
        match self.only_from {
            Some(states) => allowed.iter().filter(|s| states.contains(s)).copied().collect(),
            None => allowed.to_vec(),
        }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: Option<String>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_failure_reason<S: Into<String>>(mut self, reason: S) -> Self {
        let reason = reason.into();
        self.note = self.note.or_else(|| Some(reason.clone()));
        self.failure_reason = Some(reason);
        self
    }
}
