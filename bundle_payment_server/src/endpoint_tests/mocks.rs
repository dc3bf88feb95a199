use bpg_common::Cedis;
use bundle_payment_engine::{
    db_types::{
        FulfillmentSettings,
        FulfillmentStatus,
        FulfillmentTracking,
        Network,
        NewOrder,
        Order,
        OrderId,
        PaymentStatus,
        ProfitRecord,
        ProfitStatus,
        Shop,
        TrackingStatus,
        Wallet,
        WalletTransaction,
        WebhookEventRecord,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::{
        DispatchOutcome,
        DispatchRequest,
        FulfillmentProvider,
        GatewayError,
        GatewayPaymentStatus,
        GatewayVerification,
        OrderManagement,
        OrderQueryFilter,
        PaymentGateway,
        PaymentPipelineDatabase,
        PipelineError,
        ProviderError,
        WalletError,
    },
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use mockall::mock;

mock! {
    pub PipelineDb {}

    impl Clone for PipelineDb {
        fn clone(&self) -> Self;
    }

    impl OrderManagement for PipelineDb {
        async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PipelineError>;
        async fn claim_orders_for_export(&self, order_ids: &[OrderId], expected: FulfillmentStatus, new_status: FulfillmentStatus) -> Result<Vec<Order>, PipelineError>;
    }

    impl PaymentPipelineDatabase for PipelineDb {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), PipelineError>;
        async fn fetch_wallet(&self, user_id: i64) -> Result<Option<Wallet>, WalletError>;
        async fn debit_wallet(&self, user_id: i64, amount: Cedis, reference: &str, memo: &str) -> Result<WalletTransaction, WalletError>;
        async fn credit_wallet(&self, user_id: i64, amount: Cedis, reference: &str, memo: &str) -> Result<Option<WalletTransaction>, WalletError>;
        async fn mark_order_paid<'a>(&self, order_id: &OrderId, reference: Option<&'a str>) -> Result<Option<Order>, PipelineError>;
        async fn mark_payment_failed(&self, order_id: &OrderId, status: PaymentStatus) -> Result<Option<Order>, PipelineError>;
        async fn claim_for_dispatch(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError>;
        async fn create_tracking(&self, order_id: &OrderId, max_attempts: i64) -> Result<Option<FulfillmentTracking>, PipelineError>;
        async fn fetch_tracking(&self, order_id: &OrderId) -> Result<Option<FulfillmentTracking>, PipelineError>;
        async fn record_dispatch_sent<'a>(&self, order_id: &OrderId, provider_ref: Option<&'a str>) -> Result<FulfillmentTracking, PipelineError>;
        async fn record_dispatch_failure(&self, order_id: &OrderId, error: &str, next_retry_at: Option<DateTime<Utc>>) -> Result<FulfillmentTracking, PipelineError>;
        async fn update_tracking_status(&self, order_id: &OrderId, status: TrackingStatus) -> Result<Option<FulfillmentTracking>, PipelineError>;
        async fn mark_delivered<'a>(&self, order_id: &OrderId, provider_ref: Option<&'a str>) -> Result<Option<Order>, PipelineError>;
        async fn credit_profit(&self, order: &Order) -> Result<Option<ProfitRecord>, PipelineError>;
        async fn shop_available_balance(&self, shop_id: i64) -> Result<Cedis, PipelineError>;
        async fn fetch_shop(&self, shop_id: i64) -> Result<Option<Shop>, PipelineError>;
        async fn insert_shop(&self, name: &str, parent_shop_id: Option<i64>, parent_commission: Cedis) -> Result<Shop, PipelineError>;
        async fn record_withdrawal(&self, shop_id: i64, amount: Cedis, status: WithdrawalStatus) -> Result<Withdrawal, PipelineError>;
        async fn fetch_stale_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, PipelineError>;
        async fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<FulfillmentTracking>, PipelineError>;
        async fn insert_webhook_event<'a>(&self, event_type: &str, provider_ref: Option<&'a str>, payload: &str) -> Result<WebhookEventRecord, PipelineError>;
        async fn is_blacklisted(&self, msisdn: &str) -> Result<bool, PipelineError>;
        async fn add_to_blacklist<'a>(&self, msisdn: &str, reason: Option<&'a str>) -> Result<(), PipelineError>;
        async fn set_setting(&self, key: &str, value: &str) -> Result<(), PipelineError>;
        async fn fulfillment_settings(&self) -> Result<FulfillmentSettings, PipelineError>;
        async fn fetch_failed_but_paid(&self) -> Result<Vec<Order>, PipelineError>;
        async fn fetch_missing_profit(&self) -> Result<Vec<Order>, PipelineError>;
        async fn reset_failed_order(&self, order_id: &OrderId) -> Result<Option<Order>, PipelineError>;
        async fn close(&mut self) -> Result<(), PipelineError>;
    }
}

/// A provider stand-in for routes that carry a dispatcher but whose tests never reach the provider.
#[derive(Clone, Debug, Default)]
pub struct NullProvider;

impl FulfillmentProvider for NullProvider {
    async fn dispatch(&self, _request: &DispatchRequest) -> Result<DispatchOutcome, ProviderError> {
        Ok(DispatchOutcome { success: true, reference: None, message: None, error_code: None })
    }
}

/// A gateway stand-in for routes that carry a reconciler but whose tests never verify a payment.
#[derive(Clone, Debug, Default)]
pub struct NullGateway;

impl PaymentGateway for NullGateway {
    async fn verify(&self, _reference: &str) -> Result<GatewayVerification, GatewayError> {
        Ok(GatewayVerification {
            status: GatewayPaymentStatus::Pending,
            amount: Cedis::default(),
            message: "not verified".to_string(),
        })
    }
}

// Fixtures shared by the endpoint tests. Timestamps are pinned so response JSON is deterministic.

pub fn sample_order(order_id: &str, payment: PaymentStatus, fulfillment: FulfillmentStatus) -> Order {
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
    Order {
        id: 1,
        order_id: OrderId(order_id.to_string()),
        shop_id: 7,
        msisdn: "0241234567".to_string(),
        network: Network::Mtn,
        volume_mb: 2048,
        cost_price: Cedis::from_pesewas(2_500),
        margin: Cedis::from_pesewas(500),
        total_price: Cedis::from_pesewas(3_000),
        payment_status: payment,
        fulfillment_status: fulfillment,
        payment_reference: None,
        created_at: ts,
        updated_at: ts,
    }
}

pub fn sample_tracking(order_id: &str, status: TrackingStatus, attempts: i64) -> FulfillmentTracking {
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 9, 5, 0).unwrap();
    FulfillmentTracking {
        id: 1,
        order_id: OrderId(order_id.to_string()),
        provider_ref: None,
        attempts,
        max_attempts: 3,
        status,
        last_error: None,
        next_retry_at: None,
        created_at: ts,
        updated_at: ts,
    }
}

pub fn sample_profit(order_id: &str) -> ProfitRecord {
    ProfitRecord {
        id: 1,
        shop_id: 7,
        order_id: OrderId(order_id.to_string()),
        amount: Cedis::from_pesewas(500),
        balance_before: Cedis::from_pesewas(0),
        balance_after: Cedis::from_pesewas(500),
        status: ProfitStatus::Credited,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 10, 0).unwrap(),
    }
}

pub fn sample_webhook_event(event_type: &str) -> WebhookEventRecord {
    WebhookEventRecord {
        id: 1,
        event_type: event_type.to_string(),
        provider_ref: None,
        payload: "{}".to_string(),
        received_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 6, 0).unwrap(),
    }
}
