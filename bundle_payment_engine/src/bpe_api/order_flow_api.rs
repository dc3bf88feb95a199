use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus, TrackingStatus},
    events::{EventProducers, OrderDeliveredEvent, OrderFulfillmentFailedEvent, OrderPaidEvent},
    helpers::next_retry_after,
    traits::{OrderQueryFilter, PaymentPipelineDatabase, PipelineError, WalletError},
};

/// `OrderFlowApi` is the primary API for driving orders through their lifecycle: checkout, wallet settlement, and
/// the provider-reported state transitions coming in over webhooks.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentPipelineDatabase
{
    /// Creates a new order in `Pending`/`Unfulfilled` state. Idempotent with respect to the order id: submitting
    /// the same checkout twice returns the existing order with `false` in the second element.
    pub async fn checkout(&self, order: NewOrder) -> Result<(Order, bool), PipelineError> {
        if self.db.is_blacklisted(&order.msisdn).await? {
            warn!("🔄️📦️ Checkout for {} rejected. Recipient is blacklisted.", order.order_id);
            return Err(PipelineError::BlacklistedRecipient(order.msisdn));
        }
        let (order, inserted) = self.db.insert_order(order).await?;
        if inserted {
            debug!("🔄️📦️ Order [{}] created for shop #{} ({})", order.order_id, order.shop_id, order.total_price);
        } else {
            debug!("🔄️📦️ Order [{}] already existed. Returning it unchanged.", order.order_id);
        }
        Ok((order, inserted))
    }

    /// Settles an order from the user's wallet balance.
    ///
    /// The debit is rejected before any row is written when the balance does not cover the total. A completed
    /// debit with the order id as reference is the proof of payment; the subsequent `Pending -> Completed` claim
    /// can therefore be retried safely if this call is interrupted between the two steps.
    pub async fn pay_from_wallet(&self, order_id: &OrderId, user_id: i64) -> Result<Order, PipelineError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| PipelineError::OrderNotFound(order_id.clone()))?;
        if order.payment_status != PaymentStatus::Pending {
            debug!("🔄️💰️ Order {order_id} is {}; nothing to settle.", order.payment_status);
            return Err(PipelineError::AlreadyProcessed(order_id.clone()));
        }
        let memo = format!("{} {}MB for {}", order.network, order.volume_mb, order.msisdn);
        match self.db.debit_wallet(user_id, order.total_price, order_id.as_str(), &memo).await {
            Ok(_) => {},
            // A completed debit with this order id as reference means an earlier attempt charged the wallet and
            // was interrupted before the claim. The money moved; finish the settlement.
            Err(WalletError::DuplicateReference) => {
                info!("🔄️💰️ Order {order_id} was already debited. Completing the interrupted settlement.");
            },
            Err(e) => return Err(e.into()),
        }
        match self.db.mark_order_paid(order_id, None).await? {
            Some(order) => {
                info!("🔄️💰️ Order {order_id} settled from wallet of user {user_id} ({})", order.total_price);
                self.call_order_paid_hook(&order).await;
                Ok(order)
            },
            // The debit's reference dedup means the money moved at most once; losing this claim just means a
            // concurrent path finished the settlement.
            None => Err(PipelineError::AlreadyProcessed(order_id.clone())),
        }
    }

    /// Marks an order's payment as settled based on an external confirmation (gateway webhook or reconciliation).
    /// Returns `None` when a concurrent path already resolved the payment.
    pub async fn settle_externally(
        &self,
        order_id: &OrderId,
        reference: Option<&str>,
    ) -> Result<Option<Order>, PipelineError> {
        let order = self.db.mark_order_paid(order_id, reference).await?;
        if let Some(order) = &order {
            info!("🔄️💰️ Order {order_id} settled externally (ref: {})", reference.unwrap_or("n/a"));
            self.call_order_paid_hook(order).await;
        }
        Ok(order)
    }

    pub async fn fail_payment(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
    ) -> Result<Option<Order>, PipelineError> {
        let order = self.db.mark_payment_failed(order_id, status).await?;
        if order.is_some() {
            info!("🔄️💰️ Order {order_id} payment marked {status}");
        }
        Ok(order)
    }

    /// The terminal happy path: claims the `Delivered` transition, credits the shop's profit, and notifies
    /// subscribers. A missed claim (`None`) means the order was already delivered, so duplicate webhook deliveries
    /// fall through here without side effects.
    pub async fn confirm_delivery(
        &self,
        order_id: &OrderId,
        provider_ref: Option<&str>,
    ) -> Result<Option<Order>, PipelineError> {
        let Some(order) = self.db.mark_delivered(order_id, provider_ref).await? else {
            debug!("🔄️📦️ Order {order_id} was already delivered. Ignoring duplicate confirmation.");
            return Ok(None);
        };
        let profit = self.db.credit_profit(&order).await?;
        match profit {
            Some(p) => info!("🔄️📦️ Order {order_id} delivered. Shop #{} credited {}", order.shop_id, p.amount),
            None => info!("🔄️📦️ Order {order_id} delivered. Profit was already credited."),
        }
        self.call_order_delivered_hook(&order).await;
        Ok(Some(order))
    }

    /// Registers a provider-reported fulfillment failure against the order's active tracking record. Schedules a
    /// retry when attempts remain, otherwise goes terminal and notifies subscribers.
    pub async fn register_fulfillment_failure(&self, order_id: &OrderId, reason: &str) -> Result<(), PipelineError> {
        let tracking = self
            .db
            .fetch_tracking(order_id)
            .await?
            .ok_or_else(|| PipelineError::TrackingNotFound(order_id.clone()))?;
        if !tracking.status.is_active() {
            debug!("🔄️📦️ Order {order_id} has no active tracking record; failure report ignored.");
            return Ok(());
        }
        let next_retry = next_retry_after(&tracking, Utc::now());
        let record = self.db.record_dispatch_failure(order_id, reason, next_retry).await?;
        if record.status == TrackingStatus::Failed {
            warn!("🔄️📦️ Order {order_id} failed terminally: {reason}");
            if let Some(order) = self.db.fetch_order_by_order_id(order_id).await? {
                self.call_order_failed_hook(&order, reason).await;
            }
        } else {
            info!(
                "🔄️📦️ Order {order_id} attempt {} failed ({reason}). Retry at {:?}",
                record.attempts, record.next_retry_at
            );
        }
        Ok(())
    }

    /// Non-terminal provider updates (`order.pending`, `order.processing`) only move the tracking status.
    pub async fn update_provider_status(
        &self,
        order_id: &OrderId,
        status: TrackingStatus,
    ) -> Result<(), PipelineError> {
        let updated = self.db.update_tracking_status(order_id, status).await?;
        if updated.is_none() {
            debug!("🔄️📦️ Order {order_id} has no active tracking record; {status} update ignored.");
        }
        Ok(())
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PipelineError> {
        self.db.search_orders(query).await
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🔄️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_delivered_hook(&self, order: &Order) {
        for emitter in &self.producers.order_delivered_producer {
            debug!("🔄️📦️ Notifying order delivered hook subscribers");
            emitter.publish_event(OrderDeliveredEvent::new(order.clone())).await;
        }
    }

    async fn call_order_failed_hook(&self, order: &Order, reason: &str) {
        for emitter in &self.producers.order_failed_producer {
            debug!("🔄️📦️ Notifying order failed hook subscribers");
            emitter.publish_event(OrderFulfillmentFailedEvent::new(order.clone(), reason.to_string())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
