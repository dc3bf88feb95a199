use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{FulfillmentStatus, FulfillmentTracking, Order, OrderId, PaymentStatus, TrackingStatus},
    events::{EventProducers, OrderFulfillmentFailedEvent},
    helpers::next_retry_after,
    traits::{DispatchRequest, FulfillmentProvider, PaymentPipelineDatabase, PipelineError},
};

/// `FulfillmentDispatcher` owns the outbound leg: claiming a paid order for dispatch and sending it to the
/// external provider, with the retry schedule persisted in the tracking record.
///
/// Dispatch preconditions are checked in a fixed order. The settings gate and blacklist are advisory reads; the
/// `claim_for_dispatch` transition and the active-tracking unique index are the authoritative guards, so two
/// dispatchers racing on the same order result in exactly one provider call.
pub struct FulfillmentDispatcher<B, P> {
    db: B,
    provider: P,
    producers: EventProducers,
}

impl<B, P> Debug for FulfillmentDispatcher<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FulfillmentDispatcher")
    }
}

impl<B: Clone, P: Clone> Clone for FulfillmentDispatcher<B, P> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), provider: self.provider.clone(), producers: self.producers.clone() }
    }
}

impl<B, P> FulfillmentDispatcher<B, P> {
    pub fn new(db: B, provider: P, producers: EventProducers) -> Self {
        Self { db, provider, producers }
    }
}

impl<B, P> FulfillmentDispatcher<B, P>
where
    B: PaymentPipelineDatabase,
    P: FulfillmentProvider,
{
    /// Dispatches a paid order to the provider for the first time.
    ///
    /// Returns [`PipelineError::AlreadyProcessed`] (benign) when a concurrent dispatcher won the claim or an
    /// active tracking record already exists. All other errors mean the order was not dispatched.
    pub async fn dispatch_order(&self, order_id: &OrderId) -> Result<FulfillmentTracking, PipelineError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| PipelineError::OrderNotFound(order_id.clone()))?;
        if order.payment_status != PaymentStatus::Completed {
            return Err(PipelineError::PaymentNotCompleted(order_id.clone()));
        }
        let settings = self.db.fulfillment_settings().await?;
        if !settings.allows(order.network) {
            return Err(PipelineError::IneligibleForDispatch(
                order_id.clone(),
                format!("automatic fulfillment is disabled for {}", order.network),
            ));
        }
        if self.db.is_blacklisted(&order.msisdn).await? {
            return Err(PipelineError::BlacklistedRecipient(order.msisdn));
        }
        let Some(order) = self.db.claim_for_dispatch(order_id).await? else {
            debug!("🪛️ Order {order_id} was claimed by a concurrent dispatcher.");
            return Err(PipelineError::AlreadyProcessed(order_id.clone()));
        };
        if self.db.create_tracking(order_id, settings.max_attempts).await?.is_none() {
            debug!("🪛️ Order {order_id} already has an active tracking record. Not dispatching again.");
            return Err(PipelineError::AlreadyProcessed(order_id.clone()));
        }
        self.attempt(&order).await
    }

    /// Runs all retries whose scheduled time has passed. Returns the number of orders attempted. Individual
    /// failures are recorded against their tracking records and do not abort the sweep.
    pub async fn run_due_retries(&self) -> Result<usize, PipelineError> {
        let due = self.db.due_retries(Utc::now()).await?;
        if due.is_empty() {
            trace!("🪛️ No fulfillment retries due.");
            return Ok(0);
        }
        info!("🪛️ {} fulfillment retries due", due.len());
        let mut attempted = 0;
        for tracking in due {
            let order_id = tracking.order_id.clone();
            let order = match self.db.fetch_order_by_order_id(&order_id).await {
                Ok(Some(order)) => order,
                Ok(None) => {
                    error!("🪛️ Tracking record #{} references missing order {order_id}", tracking.id);
                    continue;
                },
                Err(e) => {
                    error!("🪛️ Could not load order {order_id} for retry: {e}. Skipping it this sweep.");
                    continue;
                },
            };
            // A webhook can deliver the order between scheduling and the sweep.
            if order.fulfillment_status != FulfillmentStatus::Processing {
                debug!("🪛️ Order {order_id} is {}; retry skipped.", order.fulfillment_status);
                continue;
            }
            attempted += 1;
            if let Err(e) = self.attempt(&order).await {
                error!("🪛️ Retry for order {order_id} could not be recorded: {e}");
            }
        }
        Ok(attempted)
    }

    /// One provider call against the order's active tracking record. A refused or failed dispatch is recorded
    /// with the next retry time, or terminally once the schedule is exhausted.
    async fn attempt(&self, order: &Order) -> Result<FulfillmentTracking, PipelineError> {
        let request = DispatchRequest::from_order(order);
        let order_id = &order.order_id;
        debug!("🪛️ Dispatching {}GB on {} to {} for order {order_id}", request.size_gb, request.network, request.phone_number);
        let outcome = self.provider.dispatch(&request).await;
        match outcome {
            Ok(result) if result.success => {
                let tracking = self.db.record_dispatch_sent(order_id, result.reference.as_deref()).await?;
                info!(
                    "🪛️ Order {order_id} dispatched on attempt {} (provider ref: {})",
                    tracking.attempts,
                    tracking.provider_ref.as_deref().unwrap_or("n/a")
                );
                Ok(tracking)
            },
            Ok(result) => {
                let reason = result.message.unwrap_or_else(|| "Provider refused the dispatch".to_string());
                self.record_failed_attempt(order, &reason).await
            },
            Err(e) => {
                let reason = e.to_string();
                self.record_failed_attempt(order, &reason).await
            },
        }
    }

    async fn record_failed_attempt(&self, order: &Order, reason: &str) -> Result<FulfillmentTracking, PipelineError> {
        let order_id = &order.order_id;
        let tracking = self
            .db
            .fetch_tracking(order_id)
            .await?
            .ok_or_else(|| PipelineError::TrackingNotFound(order_id.clone()))?;
        let next_retry = next_retry_after(&tracking, Utc::now());
        let record = self.db.record_dispatch_failure(order_id, reason, next_retry).await?;
        if record.status == TrackingStatus::Failed {
            warn!("🪛️ Order {order_id} failed terminally after {} attempts: {reason}", record.attempts);
            self.call_order_failed_hook(order, reason).await;
        } else {
            info!("🪛️ Order {order_id} attempt {} failed ({reason}). Retry at {:?}", record.attempts, record.next_retry_at);
        }
        Ok(record)
    }

    async fn call_order_failed_hook(&self, order: &Order, reason: &str) {
        for emitter in &self.producers.order_failed_producer {
            debug!("🪛️ Notifying order failed hook subscribers");
            emitter.publish_event(OrderFulfillmentFailedEvent::new(order.clone(), reason.to_string())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
