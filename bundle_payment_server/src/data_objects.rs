use std::fmt::Display;

use bpg_common::Cedis;
use bundle_payment_engine::db_types::{NewOrder, Network, OrderId};
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

/// The checkout payload a storefront submits to create an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub order_id: OrderId,
    pub shop_id: i64,
    pub msisdn: String,
    pub network: Network,
    pub volume_mb: i64,
    /// Prices arrive in pesewas, matching the ledger's native unit.
    pub cost_price: i64,
    pub margin: i64,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

impl CheckoutRequest {
    pub fn into_new_order(self) -> NewOrder {
        let mut order = NewOrder::new(self.order_id, self.shop_id, self.msisdn, self.network, self.volume_mb)
            .with_pricing(Cedis::from_pesewas(self.cost_price), Cedis::from_pesewas(self.margin));
        if let Some(reference) = self.payment_reference {
            order = order.with_payment_reference(reference);
        }
        order
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPaymentRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    pub amount: i64,
    pub reference: String,
}

/// Claims a set of orders for a batch export, e.g. pulling them into an accounting system. With `isRedownload`
/// set, orders that were already exported are handed out again instead of being refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportClaimRequest {
    pub order_ids: Vec<OrderId>,
    #[serde(default)]
    pub is_redownload: bool,
}

/// Repair trigger: either one order by id, or the full sweep with `fixAll`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub fix_all: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// The provider's webhook envelope. `event` is one of `order.delivered` (aliases: `order.completed`,
/// `order.success`), `order.failed` (alias: `order.error`), `order.pending` or `order.processing`. Anything else
/// is recorded and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentWebhook {
    pub event: String,
    pub order: FulfillmentWebhookOrder,
}

/// The order block inside the webhook envelope. Field names are the provider's wire format; everything except the
/// id is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentWebhookOrder {
    pub id: OrderId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub size_mb: Option<i64>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Webhook acknowledgement. `traceId` is the id of the audit-log row the payload was recorded under, so a
/// provider-side incident can be matched to our record of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
    pub trace_id: i64,
}

/// Webhook endpoint registration probe: the provider sends `?challenge=<nonce>` (older API versions use
/// `hub.challenge`) and expects the nonce echoed back.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChallenge {
    #[serde(alias = "hub.challenge")]
    pub challenge: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn webhook_envelope_parses() {
        let json = r#"{
            "event": "order.delivered",
            "order": { "id": "BP-1001", "status": "delivered", "size_mb": 2048, "network": "MTN" }
        }"#;
        let hook: FulfillmentWebhook = serde_json::from_str(json).unwrap();
        assert_eq!(hook.event, "order.delivered");
        assert_eq!(hook.order.id.as_str(), "BP-1001");
        assert_eq!(hook.order.status.as_deref(), Some("delivered"));
        assert_eq!(hook.order.size_mb, Some(2048));
        assert!(hook.order.message.is_none());
    }

    #[test]
    fn checkout_request_builds_an_order() {
        let json = r#"{
            "orderId": "BP-2002",
            "shopId": 4,
            "msisdn": "0551234567",
            "network": "Telecel",
            "volumeMb": 2048,
            "costPrice": 1500,
            "margin": 300
        }"#;
        let req: CheckoutRequest = serde_json::from_str(json).unwrap();
        let order = req.into_new_order();
        assert_eq!(order.total_price(), Cedis::from_pesewas(1800));
        assert!(order.payment_reference.is_none());
    }
}
