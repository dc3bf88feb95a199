use std::fmt::Debug;

use log::*;

use crate::{
    bpe_api::report_objects::{RepairAction, RepairReport},
    db_types::{FulfillmentStatus, Order, OrderId},
    traits::{PaymentPipelineDatabase, PipelineError},
};

/// `RepairApi` detects and fixes the two inconsistency classes that survive crashes between a money movement and
/// its matching state transition.
///
/// Every repair action is itself a claim transition or an idempotent insert, so running a repair twice, or
/// concurrently with the live pipeline, can only converge the data.
pub struct RepairApi<B> {
    db: B,
}

impl<B> Debug for RepairApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RepairApi")
    }
}

impl<B: Clone> Clone for RepairApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> RepairApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> RepairApi<B>
where B: PaymentPipelineDatabase
{
    /// Orders marked `Failed` despite evidence of payment: a completed wallet debit for their order id, or a
    /// gateway payment reference. The money moved; the status transition was lost.
    pub async fn find_failed_but_paid(&self) -> Result<Vec<Order>, PipelineError> {
        self.db.fetch_failed_but_paid().await
    }

    /// Paid orders in a non-terminal-failure state with no profit record.
    pub async fn find_missing_profit(&self) -> Result<Vec<Order>, PipelineError> {
        self.db.fetch_missing_profit().await
    }

    /// Resets every failed-but-paid order back to `Pending` so the reconciler re-drives it through the normal
    /// settlement flow. With `dry_run` set, reports what would be reset without touching anything.
    pub async fn repair_failed_but_paid(&self, dry_run: bool) -> Result<RepairReport, PipelineError> {
        let candidates = self.find_failed_but_paid().await?;
        let mut report = RepairReport::new(dry_run);
        report.examined = candidates.len();
        for order in candidates {
            let item = self.reset_one(&order, dry_run).await;
            if item.action == "reset" {
                report.repaired += 1;
            }
            report.results.push(item);
        }
        info!(
            "🩹️ Failed-but-paid repair{}: {}/{} orders reset",
            if dry_run { " (dry run)" } else { "" },
            report.repaired,
            report.examined
        );
        Ok(report)
    }

    /// Credits the missing profit record for every detected order. The insert is idempotent, so a webhook landing
    /// mid-repair simply turns the corresponding action into a no-op.
    pub async fn repair_missing_profit(&self, dry_run: bool) -> Result<RepairReport, PipelineError> {
        let candidates = self.find_missing_profit().await?;
        let mut report = RepairReport::new(dry_run);
        report.examined = candidates.len();
        for order in candidates {
            let item = self.credit_one(&order, dry_run).await;
            if item.action == "credited" {
                report.repaired += 1;
            }
            report.results.push(item);
        }
        info!(
            "🩹️ Missing-profit repair{}: {}/{} orders credited",
            if dry_run { " (dry run)" } else { "" },
            report.repaired,
            report.examined
        );
        Ok(report)
    }

    /// Repairs a single failed-but-paid order by id. Fails if the order is not actually in the detected set.
    pub async fn repair_failed_order(&self, order_id: &OrderId, dry_run: bool) -> Result<RepairAction, PipelineError> {
        let candidates = self.find_failed_but_paid().await?;
        let Some(order) = candidates.into_iter().find(|o| &o.order_id == order_id) else {
            return Err(PipelineError::OrderNotFound(order_id.clone()));
        };
        Ok(self.reset_one(&order, dry_run).await)
    }

    /// Credits the profit for a single order by id. Fails if the order is not in the detected set.
    pub async fn repair_profit_for_order(
        &self,
        order_id: &OrderId,
        dry_run: bool,
    ) -> Result<RepairAction, PipelineError> {
        let candidates = self.find_missing_profit().await?;
        let Some(order) = candidates.into_iter().find(|o| &o.order_id == order_id) else {
            return Err(PipelineError::OrderNotFound(order_id.clone()));
        };
        Ok(self.credit_one(&order, dry_run).await)
    }

    async fn reset_one(&self, order: &Order, dry_run: bool) -> RepairAction {
        let order_id = &order.order_id;
        if dry_run {
            return RepairAction { order_id: order_id.clone(), action: "wouldReset".to_string(), error: None };
        }
        match self.db.reset_failed_order(order_id).await {
            Ok(Some(_)) => {
                info!("🩹️ Order {order_id} reset to pending for re-settlement");
                // An order that already delivered never reaches the reconciler's profit path again, so the
                // shop's profit is backfilled here. The insert is idempotent.
                if order.fulfillment_status == FulfillmentStatus::Delivered {
                    match self.db.credit_profit(order).await {
                        Ok(Some(p)) => info!("🩹️ Backfilled profit of {} for delivered order {order_id}", p.amount),
                        Ok(None) => debug!("🩹️ Profit for delivered order {order_id} was already credited."),
                        Err(e) => warn!("🩹️ Could not backfill profit for order {order_id}: {e}"),
                    }
                }
                RepairAction { order_id: order_id.clone(), action: "reset".to_string(), error: None }
            },
            Ok(None) => {
                debug!("🩹️ Order {order_id} left failed state before the repair ran. No-op.");
                RepairAction { order_id: order_id.clone(), action: "alreadyHandled".to_string(), error: None }
            },
            Err(e) => {
                error!("🩹️ Could not reset order {order_id}: {e}");
                RepairAction { order_id: order_id.clone(), action: "error".to_string(), error: Some(e.to_string()) }
            },
        }
    }

    async fn credit_one(&self, order: &Order, dry_run: bool) -> RepairAction {
        let order_id = order.order_id.clone();
        if dry_run {
            return RepairAction { order_id, action: "wouldCredit".to_string(), error: None };
        }
        match self.db.credit_profit(order).await {
            Ok(Some(p)) => {
                info!("🩹️ Profit of {} credited to shop #{} for order {order_id}", p.amount, order.shop_id);
                RepairAction { order_id, action: "credited".to_string(), error: None }
            },
            Ok(None) => {
                debug!("🩹️ Profit for order {order_id} was credited while the repair ran. No-op.");
                RepairAction { order_id, action: "alreadyHandled".to_string(), error: None }
            },
            Err(e) => {
                error!("🩹️ Could not credit profit for order {order_id}: {e}");
                RepairAction { order_id, action: "error".to_string(), error: Some(e.to_string()) }
            },
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
