use bundle_payment_engine::{events::EventProducers, FulfillmentDispatcher, Reconciler, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

use crate::{
    config::ReconcileOptions,
    integrations::{TelcoGateway, TelcoProvider},
};

/// Starts the background reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_reconcile_worker(
    db: SqliteDatabase,
    gateway: TelcoGateway,
    provider: TelcoProvider,
    producers: EventProducers,
    options: ReconcileOptions,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider, producers.clone());
        let reconciler = Reconciler::new(db, gateway, dispatcher, producers);
        info!("🕰️ Reconciliation worker started (every {interval_secs}s)");
        loop {
            timer.tick().await;
            match reconciler.run(options.stale_order_age, options.item_delay).await {
                Ok(report) if report.total == 0 => trace!("🕰️ Reconciliation sweep found nothing to do"),
                Ok(report) => {
                    info!(
                        "🕰️ Reconciliation sweep: {}/{} verified, {} dispatched, {} failed, {} still pending",
                        report.verified, report.total, report.fulfilled, report.failed, report.still_pending
                    );
                },
                Err(e) => {
                    error!("🕰️ Error running reconciliation sweep: {e}");
                },
            }
        }
    })
}

/// Starts the fulfillment retry worker, which re-attempts dispatches whose scheduled retry time has passed. Do not
/// await the returned JoinHandle, as it will run indefinitely.
pub fn start_retry_worker(
    db: SqliteDatabase,
    provider: TelcoProvider,
    producers: EventProducers,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        let dispatcher = FulfillmentDispatcher::new(db, provider, producers);
        info!("🪛️ Fulfillment retry worker started (every {interval_secs}s)");
        loop {
            timer.tick().await;
            match dispatcher.run_due_retries().await {
                Ok(0) => trace!("🪛️ No fulfillment retries were due"),
                Ok(n) => info!("🪛️ {n} fulfillment retries attempted"),
                Err(e) => error!("🪛️ Error running fulfillment retry sweep: {e}"),
            }
        }
    })
}
