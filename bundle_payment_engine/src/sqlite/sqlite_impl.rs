//! `SqliteDatabase` is a concrete implementation of a pipeline storage backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the traits defined in the [`crate::traits`] module.
//! Every claim transition is a conditional update inside the relevant table module; this file mostly composes those
//! into atomic transactions.
use std::fmt::Debug;

use bpg_common::Cedis;
use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{blacklist, new_pool, orders, profits, settings, shops, tracking, wallets, webhook_events};
use crate::{
    db_types::{
        FulfillmentSettings,
        FulfillmentStatus,
        FulfillmentTracking,
        NewOrder,
        Order,
        OrderId,
        PaymentStatus,
        ProfitRecord,
        Shop,
        TrackingStatus,
        TransactionType,
        Wallet,
        WalletTransaction,
        WebhookEventRecord,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::{OrderManagement, OrderQueryFilter, PaymentPipelineDatabase, PipelineError, WalletError},
};

/// Bounded retry for the balance compare-and-swap when concurrent mutations interleave.
const BALANCE_CAS_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn claim_orders_for_export(
        &self,
        order_ids: &[OrderId],
        expected: FulfillmentStatus,
        new_status: FulfillmentStatus,
    ) -> Result<Vec<Order>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let claimed = orders::claim_many(order_ids, expected, new_status, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Claimed {}/{} orders for export", claimed.len(), order_ids.len());
        Ok(claimed)
    }
}

impl PaymentPipelineDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    // Write paths run inside explicitly committed transactions. A bare `INSERT .. RETURNING` on a pooled
    // connection leaves the write lock pending until that connection is reused; the commit releases it.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), PipelineError> {
        let mut tx = self.pool.begin().await?;
        let (order, inserted) = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok((order, inserted))
    }

    async fn fetch_wallet(&self, user_id: i64) -> Result<Option<Wallet>, WalletError> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_wallet(user_id, &mut conn).await
    }

    async fn debit_wallet(
        &self,
        user_id: i64,
        amount: Cedis,
        reference: &str,
        memo: &str,
    ) -> Result<WalletTransaction, WalletError> {
        if amount.value() <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        for _attempt in 0..BALANCE_CAS_ATTEMPTS {
            let mut tx = self.pool.begin().await?;
            // The dedup check must come before the balance check: a drained balance after a crash mid-settlement
            // must surface as "already debited", not as insufficient funds.
            if wallets::completed_tx_exists(user_id, reference, TransactionType::Debit, &mut tx).await? {
                debug!("🗃️ Debit [{reference}] for user {user_id} already completed.");
                return Err(WalletError::DuplicateReference);
            }
            let wallet =
                wallets::fetch_wallet(user_id, &mut tx).await?.ok_or(WalletError::WalletNotFound(user_id))?;
            if wallet.balance < amount {
                // Reject before any row is touched
                return Err(WalletError::InsufficientFunds { balance: wallet.balance, requested: amount });
            }
            match wallets::apply_mutation(&wallet, TransactionType::Debit, amount, reference, memo, &mut tx).await {
                Ok(entry) => {
                    tx.commit().await?;
                    return Ok(entry);
                },
                Err(WalletError::ConcurrentModification) => {
                    debug!("🗃️ Wallet {user_id} balance moved during debit of {amount}. Re-reading.");
                    tx.rollback().await?;
                },
                Err(e) => {
                    tx.rollback().await?;
                    return Err(e);
                },
            }
        }
        Err(WalletError::ConcurrentModification)
    }

    async fn credit_wallet(
        &self,
        user_id: i64,
        amount: Cedis,
        reference: &str,
        memo: &str,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        if amount.value() <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        for _attempt in 0..BALANCE_CAS_ATTEMPTS {
            let mut tx = self.pool.begin().await?;
            if wallets::completed_tx_exists(user_id, reference, TransactionType::Credit, &mut tx).await? {
                debug!("🗃️ Credit [{reference}] for user {user_id} already completed. Skipping.");
                return Ok(None);
            }
            let wallet = wallets::ensure_wallet(user_id, &mut tx).await?;
            match wallets::apply_mutation(&wallet, TransactionType::Credit, amount, reference, memo, &mut tx).await {
                Ok(entry) => {
                    tx.commit().await?;
                    return Ok(Some(entry));
                },
                Err(WalletError::ConcurrentModification) => {
                    debug!("🗃️ Wallet {user_id} balance moved during credit of {amount}. Re-reading.");
                    tx.rollback().await?;
                },
                Err(WalletError::DuplicateReference) => {
                    // A concurrent credit with the same reference won; the rollback undoes our balance write.
                    debug!("🗃️ Credit [{reference}] for user {user_id} completed concurrently. Skipping.");
                    tx.rollback().await?;
                    return Ok(None);
                },
                Err(e) => {
                    tx.rollback().await?;
                    return Err(e);
                },
            }
        }
        Err(WalletError::ConcurrentModification)
    }

    async fn mark_order_paid(
        &self,
        order_id: &OrderId,
        reference: Option<&str>,
    ) -> Result<Option<Order>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_paid(order_id, reference, &mut tx).await?;
        tx.commit().await?;
        if let Some(o) = &order {
            debug!("🗃️ Order {} marked as paid ({})", o.order_id, o.total_price);
        }
        Ok(order)
    }

    async fn mark_payment_failed(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
    ) -> Result<Option<Order>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_payment_failed(order_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn claim_for_dispatch(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::claim_for_dispatch(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn create_tracking(
        &self,
        order_id: &OrderId,
        max_attempts: i64,
    ) -> Result<Option<FulfillmentTracking>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let tracking = tracking::create(order_id, max_attempts, &mut tx).await?;
        tx.commit().await?;
        Ok(tracking)
    }

    async fn fetch_tracking(&self, order_id: &OrderId) -> Result<Option<FulfillmentTracking>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        tracking::latest_for_order(order_id, &mut conn).await
    }

    async fn record_dispatch_sent(
        &self,
        order_id: &OrderId,
        provider_ref: Option<&str>,
    ) -> Result<FulfillmentTracking, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let tracking = tracking::record_sent(order_id, provider_ref, &mut tx).await?;
        tx.commit().await?;
        Ok(tracking)
    }

    async fn record_dispatch_failure(
        &self,
        order_id: &OrderId,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<FulfillmentTracking, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let record = tracking::record_failure(order_id, error, next_retry_at, &mut tx).await?;
        if record.status == TrackingStatus::Failed {
            // Terminal: the order's fulfillment status follows the tracking record
            orders::mark_fulfillment_failed(order_id, &mut tx).await?;
            warn!("🗃️ Order {order_id} fulfillment failed terminally after {} attempts", record.attempts);
        }
        tx.commit().await?;
        Ok(record)
    }

    async fn update_tracking_status(
        &self,
        order_id: &OrderId,
        status: TrackingStatus,
    ) -> Result<Option<FulfillmentTracking>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let tracking = tracking::update_status(order_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(tracking)
    }

    async fn mark_delivered(
        &self,
        order_id: &OrderId,
        provider_ref: Option<&str>,
    ) -> Result<Option<Order>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_delivered(order_id, &mut tx).await?;
        if order.is_some() {
            tracking::mark_delivered(order_id, provider_ref, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn credit_profit(&self, order: &Order) -> Result<Option<ProfitRecord>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let profit = profits::idempotent_insert(order.shop_id, &order.order_id, order.margin, &mut tx).await?;
        if profit.is_some() {
            let shop = shops::fetch_shop(order.shop_id, &mut tx)
                .await?
                .ok_or(PipelineError::ShopNotFound(order.shop_id))?;
            if let Some(parent_id) = shop.parent_shop_id {
                if shop.parent_commission.value() > 0 {
                    profits::idempotent_insert(parent_id, &order.order_id, shop.parent_commission, &mut tx).await?;
                    debug!(
                        "🗃️ Parent shop {parent_id} credited {} for sub-agent order {}",
                        shop.parent_commission, order.order_id
                    );
                }
            }
        }
        tx.commit().await?;
        Ok(profit)
    }

    async fn shop_available_balance(&self, shop_id: i64) -> Result<Cedis, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        profits::available_balance(shop_id, &mut conn).await
    }

    async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        shops::fetch_shop(shop_id, &mut conn).await
    }

    async fn insert_shop(
        &self,
        name: &str,
        parent_shop_id: Option<i64>,
        parent_commission: Cedis,
    ) -> Result<Shop, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let shop = shops::insert_shop(name, parent_shop_id, parent_commission, &mut tx).await?;
        tx.commit().await?;
        Ok(shop)
    }

    async fn record_withdrawal(
        &self,
        shop_id: i64,
        amount: Cedis,
        status: WithdrawalStatus,
    ) -> Result<Withdrawal, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let withdrawal = shops::record_withdrawal(shop_id, amount, status, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn fetch_stale_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        orders::stale_pending(older_than, &mut conn).await
    }

    async fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<FulfillmentTracking>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        tracking::due_retries(now, &mut conn).await
    }

    async fn insert_webhook_event(
        &self,
        event_type: &str,
        provider_ref: Option<&str>,
        payload: &str,
    ) -> Result<WebhookEventRecord, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let event = webhook_events::insert(event_type, provider_ref, payload, &mut tx).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn is_blacklisted(&self, msisdn: &str) -> Result<bool, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        blacklist::is_blacklisted(msisdn, &mut conn).await
    }

    async fn add_to_blacklist(&self, msisdn: &str, reason: Option<&str>) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        blacklist::add(msisdn, reason, &mut conn).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        settings::set_value(key, value, &mut conn).await
    }

    async fn fulfillment_settings(&self) -> Result<FulfillmentSettings, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        settings::fulfillment_settings(&mut conn).await
    }

    async fn fetch_failed_but_paid(&self) -> Result<Vec<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        orders::failed_but_paid(&mut conn).await
    }

    async fn fetch_missing_profit(&self) -> Result<Vec<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        orders::missing_profit(&mut conn).await
    }

    async fn reset_failed_order(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::reset_failed(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.pool.close().await;
        Ok(())
    }
}
