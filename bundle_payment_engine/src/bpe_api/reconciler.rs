use std::fmt::Debug;

use chrono::Duration;
use log::*;

use crate::{
    bpe_api::{
        report_objects::{ReconcileItem, ReconcileReport},
        FulfillmentDispatcher,
    },
    db_types::{Order, PaymentStatus},
    events::{EventProducers, OrderPaidEvent},
    traits::{FulfillmentProvider, GatewayPaymentStatus, PaymentGateway, PaymentPipelineDatabase, PipelineError},
};

/// `Reconciler` sweeps stale pending orders and resolves them against the payment gateway's source of truth.
///
/// Webhooks are the fast path; this is the catch-up path for webhooks that never arrived. Both paths converge on
/// the same claim transitions, so a webhook landing mid-sweep costs nothing: whichever side wins the
/// `Pending -> Completed` claim performs the side effects, and the loser observes a miss.
pub struct Reconciler<B, G, P> {
    db: B,
    gateway: G,
    dispatcher: FulfillmentDispatcher<B, P>,
    producers: EventProducers,
}

impl<B, G, P> Debug for Reconciler<B, G, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reconciler")
    }
}

impl<B, G, P> Reconciler<B, G, P> {
    pub fn new(db: B, gateway: G, dispatcher: FulfillmentDispatcher<B, P>, producers: EventProducers) -> Self {
        Self { db, gateway, dispatcher, producers }
    }
}

impl<B, G, P> Reconciler<B, G, P>
where
    B: PaymentPipelineDatabase,
    G: PaymentGateway,
    P: FulfillmentProvider,
{
    /// Runs one reconciliation sweep over orders that have been pending for longer than `older_than`.
    ///
    /// Gateway calls are spaced `inter_item_delay` apart so a large backlog does not hammer the gateway. A failure
    /// on one order is captured in its result entry and never aborts the sweep.
    pub async fn run(
        &self,
        older_than: Duration,
        inter_item_delay: std::time::Duration,
    ) -> Result<ReconcileReport, PipelineError> {
        let stale = self.db.fetch_stale_pending_orders(older_than).await?;
        if stale.is_empty() {
            trace!("🕰️ No stale pending orders to reconcile.");
            return Ok(ReconcileReport::empty());
        }
        info!("🕰️ Reconciling {} stale pending orders", stale.len());
        let mut report = ReconcileReport::empty();
        report.total = stale.len();
        for (i, order) in stale.iter().enumerate() {
            if i > 0 && !inter_item_delay.is_zero() {
                tokio::time::sleep(inter_item_delay).await;
            }
            let item = self.reconcile_order(order).await;
            if item.error.is_some() {
                report.success = false;
            }
            match item.action.as_str() {
                "settled" | "settledAndDispatched" => report.verified += 1,
                "markedFailed" | "markedAbandoned" => report.failed += 1,
                "stillPending" => report.still_pending += 1,
                _ => {},
            }
            if item.action == "settledAndDispatched" {
                report.fulfilled += 1;
            }
            report.results.push(item);
        }
        info!(
            "🕰️ Reconciliation complete. {}/{} verified, {} dispatched, {} failed, {} still pending",
            report.verified, report.total, report.fulfilled, report.failed, report.still_pending
        );
        Ok(report)
    }

    async fn reconcile_order(&self, order: &Order) -> ReconcileItem {
        let order_id = order.order_id.clone();
        let reference = order.payment_reference.clone().unwrap_or_else(|| order_id.as_str().to_string());
        let verification = match self.gateway.verify(&reference).await {
            Ok(v) => v,
            Err(e) => {
                warn!("🕰️ Gateway verification for order {order_id} failed: {e}");
                return ReconcileItem {
                    order_id,
                    gateway_status: "error".to_string(),
                    action: "skipped".to_string(),
                    error: Some(e.to_string()),
                };
            },
        };
        let gateway_status = verification.status.to_string();
        // Re-check after the slow call: a webhook may have resolved the order while we waited on the gateway.
        let current = match self.db.fetch_order_by_order_id(&order_id).await {
            Ok(Some(o)) => o,
            Ok(None) => {
                return ReconcileItem {
                    order_id: order_id.clone(),
                    gateway_status,
                    action: "skipped".to_string(),
                    error: Some(PipelineError::OrderNotFound(order_id).to_string()),
                };
            },
            Err(e) => {
                return ReconcileItem { order_id, gateway_status, action: "skipped".to_string(), error: Some(e.to_string()) };
            },
        };
        if current.payment_status != PaymentStatus::Pending {
            debug!("🕰️ Order {order_id} resolved to {} while we were verifying. No-op.", current.payment_status);
            return ReconcileItem { order_id, gateway_status, action: "alreadyHandled".to_string(), error: None };
        }
        match verification.status {
            GatewayPaymentStatus::Success => {
                if verification.amount != current.total_price {
                    error!(
                        "🕰️ Order {order_id} gateway amount {} does not match order total {}. Leaving for manual review.",
                        verification.amount, current.total_price
                    );
                    return ReconcileItem {
                        order_id,
                        gateway_status,
                        action: "amountMismatch".to_string(),
                        error: Some(format!(
                            "gateway reports {}, order total is {}",
                            verification.amount, current.total_price
                        )),
                    };
                }
                self.settle_and_dispatch(&order_id, &reference, gateway_status).await
            },
            GatewayPaymentStatus::Failed => self.mark_failed(&order_id, PaymentStatus::Failed, gateway_status).await,
            GatewayPaymentStatus::Abandoned => {
                self.mark_failed(&order_id, PaymentStatus::Abandoned, gateway_status).await
            },
            GatewayPaymentStatus::Pending => {
                trace!("🕰️ Order {order_id} is still pending at the gateway.");
                ReconcileItem { order_id, gateway_status, action: "stillPending".to_string(), error: None }
            },
        }
    }

    async fn settle_and_dispatch(
        &self,
        order_id: &crate::db_types::OrderId,
        reference: &str,
        gateway_status: String,
    ) -> ReconcileItem {
        let settled = match self.db.mark_order_paid(order_id, Some(reference)).await {
            Ok(settled) => settled,
            Err(e) => {
                return ReconcileItem {
                    order_id: order_id.clone(),
                    gateway_status,
                    action: "skipped".to_string(),
                    error: Some(e.to_string()),
                };
            },
        };
        let Some(order) = settled else {
            return ReconcileItem {
                order_id: order_id.clone(),
                gateway_status,
                action: "alreadyHandled".to_string(),
                error: None,
            };
        };
        info!("🕰️ Order {order_id} verified as paid at the gateway and settled.");
        self.call_order_paid_hook(&order).await;
        match self.dispatcher.dispatch_order(order_id).await {
            Ok(_) => ReconcileItem {
                order_id: order_id.clone(),
                gateway_status,
                action: "settledAndDispatched".to_string(),
                error: None,
            },
            Err(e) if e.is_benign() => {
                ReconcileItem { order_id: order_id.clone(), gateway_status, action: "settled".to_string(), error: None }
            },
            Err(e) => {
                warn!("🕰️ Order {order_id} was settled but could not be dispatched: {e}");
                ReconcileItem {
                    order_id: order_id.clone(),
                    gateway_status,
                    action: "settled".to_string(),
                    error: Some(e.to_string()),
                }
            },
        }
    }

    async fn mark_failed(
        &self,
        order_id: &crate::db_types::OrderId,
        status: PaymentStatus,
        gateway_status: String,
    ) -> ReconcileItem {
        let action =
            if status == PaymentStatus::Abandoned { "markedAbandoned".to_string() } else { "markedFailed".to_string() };
        match self.db.mark_payment_failed(order_id, status).await {
            Ok(Some(_)) => {
                info!("🕰️ Order {order_id} marked {status} per the gateway.");
                ReconcileItem { order_id: order_id.clone(), gateway_status, action, error: None }
            },
            Ok(None) => ReconcileItem {
                order_id: order_id.clone(),
                gateway_status,
                action: "alreadyHandled".to_string(),
                error: None,
            },
            Err(e) => ReconcileItem {
                order_id: order_id.clone(),
                gateway_status,
                action: "skipped".to_string(),
                error: Some(e.to_string()),
            },
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🕰️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }
}
