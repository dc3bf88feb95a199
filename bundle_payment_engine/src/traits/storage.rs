use bpg_common::Cedis;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

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
        Wallet,
        WalletTransaction,
        WebhookEventRecord,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::OrderQueryFilter,
};

/// Read access to orders, plus the batch-export claim.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError>;

    /// Fetches orders according to the criteria in the `OrderQueryFilter`, ordered by `created_at` ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PipelineError>;

    /// Claims the given orders for an exclusive side effect (e.g. a batch export).
    ///
    /// Each order is transitioned with a conditional update (`... WHERE order_id = ? AND fulfillment_status = ?`).
    /// Only orders whose row was actually updated are returned; callers that lose the race on every id simply get an
    /// empty working set back.
    async fn claim_orders_for_export(
        &self,
        order_ids: &[OrderId],
        expected: FulfillmentStatus,
        new_status: FulfillmentStatus,
    ) -> Result<Vec<Order>, PipelineError>;
}

/// The highest level of behaviour for backends supporting the payment-settlement and fulfillment pipeline.
///
/// Every transition that triggers an external side effect is expressed as a conditional update returning
/// `Option<_>`: `Some` means this caller won the claim and owns the side effect, `None` means a concurrent caller
/// got there first and this caller must treat the work as already handled. This is the pipeline's substitute for
/// cross-process locks and must hold for any backend.
#[allow(async_fn_in_trait)]
pub trait PaymentPipelineDatabase: Clone + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order. This call is idempotent; returns `false` in the second element if the order already
    /// existed.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), PipelineError>;

    async fn fetch_wallet(&self, user_id: i64) -> Result<Option<Wallet>, WalletError>;

    /// Debits the user's wallet. Fails with [`WalletError::InsufficientFunds`] before any row is touched if the
    /// balance does not cover the amount. The balance write is conditional on the balance read; the transaction row
    /// is only inserted after the balance write succeeds, so a transaction row is the source of truth for "was this
    /// actually charged". A completed debit with the same reference fails with
    /// [`WalletError::DuplicateReference`] before the balance is consulted, which is how an interrupted settlement
    /// can be resumed without charging twice.
    async fn debit_wallet(
        &self,
        user_id: i64,
        amount: Cedis,
        reference: &str,
        memo: &str,
    ) -> Result<WalletTransaction, WalletError>;

    /// Credits the user's wallet, idempotently with respect to `reference`: if a `Completed` credit with the same
    /// reference already exists, nothing is written and `None` is returned. This is what lets reconciliation re-run
    /// safely.
    async fn credit_wallet(
        &self,
        user_id: i64,
        amount: Cedis,
        reference: &str,
        memo: &str,
    ) -> Result<Option<WalletTransaction>, WalletError>;

    /// Claim transition `payment_status: Pending -> Completed`. Returns `None` if the order was not in `Pending`
    /// (a concurrent path already resolved it).
    async fn mark_order_paid(&self, order_id: &OrderId, reference: Option<&str>)
        -> Result<Option<Order>, PipelineError>;

    /// Claim transition `payment_status: Pending -> Failed | Abandoned`.
    async fn mark_payment_failed(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
    ) -> Result<Option<Order>, PipelineError>;

    /// Claim transition `fulfillment_status: Unfulfilled | Failed -> Processing`, guarded on
    /// `payment_status = Completed`. No dispatch may begin without winning this claim.
    async fn claim_for_dispatch(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError>;

    /// Creates the tracking record for an order's dispatch. Returns `None` if an active record already exists --
    /// the existence of an active record is the dedup guard against double fulfillment.
    async fn create_tracking(
        &self,
        order_id: &OrderId,
        max_attempts: i64,
    ) -> Result<Option<FulfillmentTracking>, PipelineError>;

    async fn fetch_tracking(&self, order_id: &OrderId) -> Result<Option<FulfillmentTracking>, PipelineError>;

    /// Records that the provider accepted the dispatch (attempt counted, status `Sent`).
    async fn record_dispatch_sent(
        &self,
        order_id: &OrderId,
        provider_ref: Option<&str>,
    ) -> Result<FulfillmentTracking, PipelineError>;

    /// Records a failed attempt. With `Some(next_retry_at)` the record stays active and becomes eligible for retry
    /// at that time; with `None` the record goes terminal (`Failed`) and the order's fulfillment status follows.
    async fn record_dispatch_failure(
        &self,
        order_id: &OrderId,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<FulfillmentTracking, PipelineError>;

    /// Marks tracking rows whose webhook reported a non-terminal provider state.
    async fn update_tracking_status(
        &self,
        order_id: &OrderId,
        status: TrackingStatus,
    ) -> Result<Option<FulfillmentTracking>, PipelineError>;

    /// Claim transition `fulfillment_status: Processing | Failed -> Delivered` with the matching tracking update.
    /// Returns `None` when the order is already `Delivered`, which is how duplicate webhook deliveries become
    /// no-ops.
    async fn mark_delivered(
        &self,
        order_id: &OrderId,
        provider_ref: Option<&str>,
    ) -> Result<Option<Order>, PipelineError>;

    /// Creates the profit record for a delivered order, exactly once: an existing record (pre-check or unique
    /// constraint conflict) yields `None` and leaves all balances untouched. Credits the parent shop's commission
    /// in the same transaction when the shop has a parent. Balance snapshots are fully re-derived from the profit
    /// and withdrawal rows, never incremented.
    async fn credit_profit(&self, order: &Order) -> Result<Option<ProfitRecord>, PipelineError>;

    /// `SUM(credited profits) - SUM(approved withdrawals)` for the shop. Self-healing by construction.
    async fn shop_available_balance(&self, shop_id: i64) -> Result<Cedis, PipelineError>;

    async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, PipelineError>;

    async fn insert_shop(
        &self,
        name: &str,
        parent_shop_id: Option<i64>,
        parent_commission: Cedis,
    ) -> Result<Shop, PipelineError>;

    /// Records a withdrawal request against a shop. Only `Approved` withdrawals count against the available
    /// balance.
    async fn record_withdrawal(
        &self,
        shop_id: i64,
        amount: Cedis,
        status: WithdrawalStatus,
    ) -> Result<Withdrawal, PipelineError>;

    /// Orders that should have resolved but haven't: `payment_status = Pending` and older than `older_than`.
    async fn fetch_stale_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, PipelineError>;

    /// Active tracking records whose `next_retry_at` has passed.
    async fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<FulfillmentTracking>, PipelineError>;

    /// Appends the raw webhook payload to the audit log. Never mutated afterwards.
    async fn insert_webhook_event(
        &self,
        event_type: &str,
        provider_ref: Option<&str>,
        payload: &str,
    ) -> Result<WebhookEventRecord, PipelineError>;

    async fn is_blacklisted(&self, msisdn: &str) -> Result<bool, PipelineError>;

    async fn add_to_blacklist(&self, msisdn: &str, reason: Option<&str>) -> Result<(), PipelineError>;

    /// Writes one key in the settings store (upsert).
    async fn set_setting(&self, key: &str, value: &str) -> Result<(), PipelineError>;

    /// Reads the global fulfillment switches from the settings store. Called once per operation; the result is
    /// passed down rather than re-read mid-flight.
    async fn fulfillment_settings(&self) -> Result<FulfillmentSettings, PipelineError>;

    /// Repair query: orders marked `payment_status = Failed` that nevertheless carry evidence of payment, either
    /// a `Completed` debit in the ledger for their order id or a gateway payment reference on the order.
    async fn fetch_failed_but_paid(&self) -> Result<Vec<Order>, PipelineError>;

    /// Repair query: paid orders in a non-terminal-failure state with no profit record at all.
    async fn fetch_missing_profit(&self) -> Result<Vec<Order>, PipelineError>;

    /// Repair action: claim transition `payment_status: Failed -> Pending` so the reconciler can re-drive the
    /// order.
    async fn reset_failed_order(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("Insufficient funds. The balance of {balance} does not cover a debit of {requested}")]
    InsufficientFunds { balance: Cedis, requested: Cedis },
    #[error("The wallet for user {0} does not exist")]
    WalletNotFound(i64),
    #[error("The wallet balance changed while the mutation was in flight")]
    ConcurrentModification,
    #[error("A completed ledger entry already exists for this reference")]
    DuplicateReference,
    #[error("Ledger amounts must be positive. Got {0}")]
    InvalidAmount(Cedis),
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("We have an internal database engine error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("{0}")]
    WalletError(#[from] WalletError),
    #[error("The requested shop {0} does not exist")]
    ShopNotFound(i64),
    #[error("Order {0} has already been processed by a concurrent path")]
    AlreadyProcessed(OrderId),
    #[error("Order {0} cannot be dispatched before its payment is completed")]
    PaymentNotCompleted(OrderId),
    #[error("Recipient {0} is blacklisted")]
    BlacklistedRecipient(String),
    #[error("Order {0} is not eligible for automatic fulfillment: {1}")]
    IneligibleForDispatch(OrderId, String),
    #[error("No tracking record exists for order {0}")]
    TrackingNotFound(OrderId),
}

impl PipelineError {
    /// `AlreadyProcessed` is a claim-miss, not a failure: the work is done, just not by us.
    pub fn is_benign(&self) -> bool {
        matches!(self, PipelineError::AlreadyProcessed(_))
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::DatabaseError(e.to_string())
    }
}
