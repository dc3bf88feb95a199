use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{FulfillmentStatus, Network, OrderId, PaymentStatus};

/// Search criteria for orders. Empty fields are not constrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub shop_id: Option<i64>,
    pub msisdn: Option<String>,
    pub network: Option<Network>,
    pub payment_status: Option<Vec<PaymentStatus>>,
    pub fulfillment_status: Option<Vec<FulfillmentStatus>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_shop_id(mut self, shop_id: i64) -> Self {
        self.shop_id = Some(shop_id);
        self
    }

    pub fn with_msisdn<S: Into<String>>(mut self, msisdn: S) -> Self {
        self.msisdn = Some(msisdn.into());
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_fulfillment_status(mut self, status: FulfillmentStatus) -> Self {
        self.fulfillment_status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none()
            && self.shop_id.is_none()
            && self.msisdn.is_none()
            && self.network.is_none()
            && self.payment_status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.fulfillment_status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.since.is_none()
            && self.until.is_none()
    }
}
