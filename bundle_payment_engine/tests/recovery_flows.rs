//! The catch-up and repair paths: retry scheduling, reconciliation against the gateway, and the two repair jobs.

mod support;

use std::time::Duration as StdDuration;

use bpg_common::Cedis;
use bundle_payment_engine::{
    db_types::*,
    events::EventProducers,
    traits::{GatewayPaymentStatus, OrderManagement, PaymentPipelineDatabase},
    FulfillmentDispatcher,
    OrderFlowApi,
    Reconciler,
    RepairApi,
    SqliteDatabase,
};
use chrono::Duration;
use tokio::runtime::Runtime;

use crate::support::{backdate_order, make_retry_due, new_order, prepare_db, CannedProvider, StubGateway};

async fn paid_order(db: &SqliteDatabase, order_id: &str, shop_id: i64, user_id: i64) -> Order {
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let (order, _) = orders
        .checkout(
            new_order(order_id, shop_id, "0241234567", Network::Mtn, 2048)
                .with_pricing(Cedis::from_cedis(4), Cedis::from_cedis(1)),
        )
        .await
        .unwrap();
    db.credit_wallet(user_id, order.total_price, &format!("TOPUP-{order_id}"), "seed").await.unwrap();
    orders.pay_from_wallet(&order.order_id, user_id).await.unwrap()
}

#[test]
fn failed_dispatches_follow_the_retry_schedule() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("retry_schedule").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let order = paid_order(&db, "BP-6001", shop.id, 11).await;
        let provider = CannedProvider::always_fails();
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), EventProducers::default());

        // First attempt fails and schedules a retry
        let tracking = dispatcher.dispatch_order(&order.order_id).await.unwrap();
        assert_eq!(tracking.attempts, 1);
        assert_eq!(tracking.status, TrackingStatus::Pending);
        assert!(tracking.next_retry_at.is_some());

        // Nothing is due until the scheduled time passes
        assert_eq!(dispatcher.run_due_retries().await.unwrap(), 0);

        make_retry_due(&db, &order.order_id).await;
        assert_eq!(dispatcher.run_due_retries().await.unwrap(), 1);
        let tracking = db.fetch_tracking(&order.order_id).await.unwrap().unwrap();
        assert_eq!(tracking.attempts, 2);
        assert_eq!(tracking.status, TrackingStatus::Pending);

        // The third failure exhausts the schedule and goes terminal
        make_retry_due(&db, &order.order_id).await;
        assert_eq!(dispatcher.run_due_retries().await.unwrap(), 1);
        let tracking = db.fetch_tracking(&order.order_id).await.unwrap().unwrap();
        assert_eq!(tracking.attempts, 3);
        assert_eq!(tracking.status, TrackingStatus::Failed);
        assert!(tracking.next_retry_at.is_none());
        let order = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Failed);
        assert_eq!(provider.calls(), 3);

        // A terminal record is never picked up again
        assert_eq!(dispatcher.run_due_retries().await.unwrap(), 0);
    });
}

#[test]
fn recovery_after_transient_provider_outage() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("transient_outage").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let order = paid_order(&db, "BP-6101", shop.id, 12).await;
        let provider = CannedProvider::fails_first(1, "MTN-REF-9");
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), EventProducers::default());

        let tracking = dispatcher.dispatch_order(&order.order_id).await.unwrap();
        assert_eq!(tracking.status, TrackingStatus::Pending);

        make_retry_due(&db, &order.order_id).await;
        assert_eq!(dispatcher.run_due_retries().await.unwrap(), 1);
        let tracking = db.fetch_tracking(&order.order_id).await.unwrap().unwrap();
        assert_eq!(tracking.status, TrackingStatus::Sent);
        assert_eq!(tracking.attempts, 2);
        assert_eq!(tracking.provider_ref.as_deref(), Some("MTN-REF-9"));
    });
}

#[test]
fn reconciler_settles_stale_orders_the_gateway_confirms() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("reconcile_success").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
        let (order, _) = orders
            .checkout(
                new_order("BP-7001", shop.id, "0551234567", Network::Telecel, 1024)
                    .with_pricing(Cedis::from_cedis(3), Cedis::from_cedis(1)),
            )
            .await
            .unwrap();
        backdate_order(&db, &order.order_id, 30).await;

        let gateway = StubGateway::new(GatewayPaymentStatus::Success, order.total_price);
        let provider = CannedProvider::always_succeeds("TEL-REF");
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), EventProducers::default());
        let reconciler = Reconciler::new(db.clone(), gateway, dispatcher, EventProducers::default());

        let report = reconciler.run(Duration::minutes(10), StdDuration::ZERO).await.unwrap();
        assert!(report.success);
        assert_eq!(report.total, 1);
        assert_eq!(report.verified, 1);
        assert_eq!(report.fulfilled, 1);
        assert_eq!(report.results[0].action, "settledAndDispatched");

        let order = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Processing);
        assert_eq!(provider.calls(), 1);

        // The order is resolved; a second sweep finds nothing
        let report = reconciler.run(Duration::minutes(10), StdDuration::ZERO).await.unwrap();
        assert_eq!(report.total, 0);
    });
}

#[test]
fn reconciler_respects_the_gateway_verdict() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("reconcile_verdicts").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
        let (order, _) = orders
            .checkout(
                new_order("BP-7101", shop.id, "0201234567", Network::AtIshare, 5120)
                    .with_pricing(Cedis::from_cedis(8), Cedis::from_cedis(2)),
            )
            .await
            .unwrap();
        backdate_order(&db, &order.order_id, 30).await;
        let provider = CannedProvider::always_succeeds("REF");

        // Still pending at the gateway: left alone
        let gateway = StubGateway::new(GatewayPaymentStatus::Pending, order.total_price);
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), EventProducers::default());
        let reconciler = Reconciler::new(db.clone(), gateway, dispatcher, EventProducers::default());
        let report = reconciler.run(Duration::minutes(10), StdDuration::ZERO).await.unwrap();
        assert_eq!(report.still_pending, 1);
        let current = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Pending);

        // An amount mismatch is flagged for review, never settled
        let gateway = StubGateway::new(GatewayPaymentStatus::Success, Cedis::from_cedis(1));
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), EventProducers::default());
        let reconciler = Reconciler::new(db.clone(), gateway, dispatcher, EventProducers::default());
        let report = reconciler.run(Duration::minutes(10), StdDuration::ZERO).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.results[0].action, "amountMismatch");
        let current = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Pending);

        // Abandoned at the gateway: closed out
        let gateway = StubGateway::new(GatewayPaymentStatus::Abandoned, order.total_price);
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), EventProducers::default());
        let reconciler = Reconciler::new(db.clone(), gateway, dispatcher, EventProducers::default());
        let report = reconciler.run(Duration::minutes(10), StdDuration::ZERO).await.unwrap();
        assert_eq!(report.failed, 1);
        let current = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Abandoned);
        assert_eq!(provider.calls(), 0);
    });
}

#[test]
fn failed_but_paid_orders_are_reset_for_resettlement() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("repair_failed_but_paid").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let order = paid_order(&db, "BP-8001", shop.id, 21).await;
        // Simulate the crash: the debit stands but the payment status regressed to Failed
        sqlx::query("UPDATE orders SET payment_status = 'Failed' WHERE order_id = $1")
            .bind(order.order_id.as_str())
            .execute(db.pool())
            .await
            .unwrap();

        let repair = RepairApi::new(db.clone());

        // Dry run reports without touching anything
        let report = repair.repair_failed_but_paid(true).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.repaired, 0);
        assert_eq!(report.results[0].action, "wouldReset");
        let current = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Failed);

        let report = repair.repair_failed_but_paid(false).await.unwrap();
        assert_eq!(report.repaired, 1);
        let current = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Pending);

        // Running the repair again finds nothing to fix
        let report = repair.repair_failed_but_paid(false).await.unwrap();
        assert_eq!(report.examined, 0);
    });
}

#[test]
fn interrupted_wallet_settlements_complete_on_retry() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("interrupted_settlement").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
        let (order, _) = orders
            .checkout(
                new_order("BP-8201", shop.id, "0241234567", Network::Mtn, 2048)
                    .with_pricing(Cedis::from_cedis(4), Cedis::from_cedis(1)),
            )
            .await
            .unwrap();
        db.credit_wallet(31, order.total_price, "TOPUP-BP-8201", "seed").await.unwrap();
        // The first settlement attempt charged the wallet and crashed before the payment claim
        db.debit_wallet(31, order.total_price, order.order_id.as_str(), "first attempt").await.unwrap();

        // The retry finds the wallet drained but the debit on record, and finishes the settlement
        let settled = orders.pay_from_wallet(&order.order_id, 31).await.unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Completed);
        let wallet = db.fetch_wallet(31).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Cedis::default());
        assert_eq!(wallet.total_debited, order.total_price);
    });
}

#[test]
fn gateway_settled_orders_marked_failed_are_reset() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("repair_gateway_paid").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
        // Paid at the gateway, so there is a payment reference but no wallet debit
        let (order, _) = orders
            .checkout(
                new_order("BP-8301", shop.id, "0551234567", Network::Telecel, 1024)
                    .with_pricing(Cedis::from_cedis(3), Cedis::from_cedis(1))
                    .with_payment_reference("PAYREF-8301".to_string()),
            )
            .await
            .unwrap();
        sqlx::query("UPDATE orders SET payment_status = 'Failed' WHERE order_id = $1")
            .bind(order.order_id.as_str())
            .execute(db.pool())
            .await
            .unwrap();

        let repair = RepairApi::new(db.clone());
        assert_eq!(repair.find_failed_but_paid().await.unwrap().len(), 1);
        let report = repair.repair_failed_but_paid(false).await.unwrap();
        assert_eq!(report.repaired, 1);
        let current = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Pending);
    });
}

#[test]
fn profit_is_backfilled_when_a_delivered_order_is_repaired() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("repair_delivered_profit").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let order = paid_order(&db, "BP-8401", shop.id, 23).await;
        // Delivered at the storage layer, so the profit credit never ran; then the payment status regresses
        db.claim_for_dispatch(&order.order_id).await.unwrap().unwrap();
        db.mark_delivered(&order.order_id, Some("REF")).await.unwrap().unwrap();
        sqlx::query("UPDATE orders SET payment_status = 'Failed' WHERE order_id = $1")
            .bind(order.order_id.as_str())
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(db.shop_available_balance(shop.id).await.unwrap(), Cedis::default());

        let repair = RepairApi::new(db.clone());
        let report = repair.repair_failed_but_paid(false).await.unwrap();
        assert_eq!(report.repaired, 1);
        let current = db.fetch_order_by_order_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Pending);
        assert_eq!(db.shop_available_balance(shop.id).await.unwrap(), Cedis::from_cedis(1));
    });
}

#[test]
fn retry_sweep_continues_past_a_broken_record() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("retry_sweep_continues").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let first = paid_order(&db, "BP-8501", shop.id, 24).await;
        let second = paid_order(&db, "BP-8502", shop.id, 25).await;
        let provider = CannedProvider::always_fails();
        let dispatcher = FulfillmentDispatcher::new(db.clone(), provider.clone(), EventProducers::default());
        dispatcher.dispatch_order(&first.order_id).await.unwrap();
        dispatcher.dispatch_order(&second.order_id).await.unwrap();
        make_retry_due(&db, &first.order_id).await;
        make_retry_due(&db, &second.order_id).await;

        // Orphan the first tracking record by removing its order out from under it
        let mut conn = db.pool().acquire().await.unwrap();
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *conn).await.unwrap();
        sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(first.order_id.as_str())
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        // The broken record is skipped; the healthy one is still attempted
        assert_eq!(dispatcher.run_due_retries().await.unwrap(), 1);
        let tracking = db.fetch_tracking(&second.order_id).await.unwrap().unwrap();
        assert_eq!(tracking.attempts, 2);
    });
}

#[test]
fn missing_profits_are_credited_exactly_once() {
    let sys = Runtime::new().unwrap();
    sys.block_on(async move {
        let db = prepare_db("repair_missing_profit").await;
        let shop = db.insert_shop("Main branch", None, Cedis::default()).await.unwrap();
        let order = paid_order(&db, "BP-8101", shop.id, 22).await;
        // Delivered directly at the storage layer, so no profit was credited
        db.claim_for_dispatch(&order.order_id).await.unwrap().unwrap();
        db.mark_delivered(&order.order_id, Some("REF")).await.unwrap().unwrap();
        assert_eq!(db.shop_available_balance(shop.id).await.unwrap(), Cedis::default());

        let repair = RepairApi::new(db.clone());
        let report = repair.repair_missing_profit(false).await.unwrap();
        assert_eq!(report.repaired, 1);
        assert_eq!(db.shop_available_balance(shop.id).await.unwrap(), Cedis::from_cedis(1));

        // Idempotent: a second run credits nothing further
        let report = repair.repair_missing_profit(false).await.unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(db.shop_available_balance(shop.id).await.unwrap(), Cedis::from_cedis(1));
    });
}
