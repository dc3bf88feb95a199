use std::fmt::Display;

use bpg_common::Cedis;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Network, Order, OrderId};

//--------------------------------------   Payment gateway   ---------------------------------------------------------

/// What the gateway reports as the ground truth for a payment reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
}

impl Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayPaymentStatus::Success => write!(f, "success"),
            GatewayPaymentStatus::Failed => write!(f, "failed"),
            GatewayPaymentStatus::Abandoned => write!(f, "abandoned"),
            GatewayPaymentStatus::Pending => write!(f, "pending"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayVerification {
    pub status: GatewayPaymentStatus,
    /// Already converted from the gateway's minor units; [`Cedis`] stores pesewas natively.
    pub amount: Cedis,
    pub message: String,
}

/// Verifies an external payment reference against the gateway's source of truth. Stateless relative to the domain.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone + Send + Sync {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Timeout or 5xx. The caller must treat this as "unknown outcome"; the reconciler retries on its own schedule.
    #[error("The payment gateway is unavailable: {0}")]
    Unavailable(String),
    #[error("The gateway does not recognise the reference {0}")]
    UnknownReference(String),
    #[error("The gateway returned a response we could not interpret: {0}")]
    ResponseError(String),
}

//-------------------------------------- Fulfillment provider --------------------------------------------------------

/// A "deliver N GB to phone X on network Y" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub phone_number: String,
    pub size_gb: f64,
    pub order_id: OrderId,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_big_time: Option<bool>,
}

impl DispatchRequest {
    pub fn from_order(order: &Order) -> Self {
        Self {
            phone_number: order.msisdn.clone(),
            size_gb: order.volume_mb as f64 / 1024.0,
            order_id: order.order_id.clone(),
            network: order.network.provider_code().to_string(),
            order_type: None,
            is_big_time: order.network.is_big_time().then_some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Sends a dispatch request to the external telecom API. Implementations must enforce a bounded timeout.
#[allow(async_fn_in_trait)]
pub trait FulfillmentProvider: Clone + Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, ProviderError>;
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Timeout or 5xx. Never interpreted as success; the attempt is recorded as failed and retried on schedule.
    #[error("The fulfillment provider is unavailable: {0}")]
    Unavailable(String),
    #[error("The provider rejected the dispatch ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("The provider returned a response we could not interpret: {0}")]
    ResponseError(String),
}

#[cfg(test)]
mod test {
    use bpg_common::Cedis;
    use chrono::Utc;

    use super::*;
    use crate::db_types::{FulfillmentStatus, PaymentStatus};

    fn order(network: Network, volume_mb: i64) -> Order {
        Order {
            id: 1,
            order_id: OrderId("BP-1001".into()),
            shop_id: 7,
            msisdn: "0241234567".into(),
            network,
            volume_mb,
            cost_price: Cedis::from_pesewas(2_500),
            margin: Cedis::from_pesewas(500),
            total_price: Cedis::from_pesewas(3_000),
            payment_status: PaymentStatus::Completed,
            fulfillment_status: FulfillmentStatus::Unfulfilled,
            payment_reference: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dispatch_request_from_order() {
        let req = DispatchRequest::from_order(&order(Network::Mtn, 2048));
        assert_eq!(req.phone_number, "0241234567");
        assert!((req.size_gb - 2.0).abs() < f64::EPSILON);
        assert_eq!(req.network, "mtn");
        assert_eq!(req.is_big_time, None);
    }

    #[test]
    fn big_time_flag_is_set_for_bigtime_orders() {
        let req = DispatchRequest::from_order(&order(Network::AtBigTime, 5120));
        assert_eq!(req.network, "at-bigtime");
        assert_eq!(req.is_big_time, Some(true));
    }

    #[test]
    fn dispatch_request_serialises_camel_case() {
        let req = DispatchRequest::from_order(&order(Network::Telecel, 1024));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["phoneNumber"], "0241234567");
        assert_eq!(json["sizeGb"], 1.0);
        assert!(json.get("isBigTime").is_none());
    }
}
