use crate::db_types::Order;

/// Emitted when an order's payment leg settles. Subscribers typically send the payment-confirmation SMS.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted exactly once per order, when the delivery claim is won. Subscribers send the delivery notification.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDeliveredEvent {
    pub order: Order,
}

impl OrderDeliveredEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when an order lands in terminal fulfillment failure, after all retries are exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFulfillmentFailedEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderFulfillmentFailedEvent {
    pub fn new(order: Order, reason: String) -> Self {
        Self { order, reason }
    }
}
