//! Shared fixtures for the engine integration tests: a throwaway SQLite database per test and canned
//! implementations of the external adapters.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bpg_common::Cedis;
use bundle_payment_engine::{
    db_types::{Network, NewOrder, OrderId},
    test_utils::prepare_env::prepare_test_env,
    traits::{
        DispatchOutcome,
        DispatchRequest,
        FulfillmentProvider,
        GatewayError,
        GatewayPaymentStatus,
        GatewayVerification,
        PaymentGateway,
        ProviderError,
    },
    SqliteDatabase,
};
use chrono::{Duration, Utc};

pub async fn prepare_db(name: &str) -> SqliteDatabase {
    let url = format!("sqlite://../data/test_{name}.db");
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub fn new_order(order_id: &str, shop_id: i64, msisdn: &str, network: Network, volume_mb: i64) -> NewOrder {
    NewOrder::new(OrderId(order_id.to_string()), shop_id, msisdn.to_string(), network, volume_mb)
}

/// Rewinds an order's `created_at` so it qualifies as stale for the reconciler.
pub async fn backdate_order(db: &SqliteDatabase, order_id: &OrderId, minutes: i64) {
    sqlx::query("UPDATE orders SET created_at = $2 WHERE order_id = $1")
        .bind(order_id.as_str())
        .bind(Utc::now() - Duration::minutes(minutes))
        .execute(db.pool())
        .await
        .expect("Error backdating order");
}

/// Pulls a scheduled retry into the past so the next sweep picks it up.
pub async fn make_retry_due(db: &SqliteDatabase, order_id: &OrderId) {
    sqlx::query("UPDATE fulfillment_tracking SET next_retry_at = $2 WHERE order_id = $1")
        .bind(order_id.as_str())
        .bind(Utc::now() - Duration::minutes(1))
        .execute(db.pool())
        .await
        .expect("Error rescheduling retry");
}

/// A fulfillment provider that fails its first `fail_first` calls and succeeds afterwards.
#[derive(Clone)]
pub struct CannedProvider {
    reference: Option<String>,
    fail_first: usize,
    calls: Arc<AtomicUsize>,
}

impl CannedProvider {
    pub fn always_succeeds(reference: &str) -> Self {
        Self { reference: Some(reference.to_string()), fail_first: 0, calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn always_fails() -> Self {
        Self { reference: None, fail_first: usize::MAX, calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn fails_first(n: usize, reference: &str) -> Self {
        Self { reference: Some(reference.to_string()), fail_first: n, calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FulfillmentProvider for CannedProvider {
    async fn dispatch(&self, _request: &DispatchRequest) -> Result<DispatchOutcome, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(ProviderError::Unavailable("connection timed out".to_string()));
        }
        Ok(DispatchOutcome { success: true, reference: self.reference.clone(), message: None, error_code: None })
    }
}

/// A payment gateway that reports the same verdict for every reference.
#[derive(Clone)]
pub struct StubGateway {
    status: GatewayPaymentStatus,
    amount: Cedis,
}

impl StubGateway {
    pub fn new(status: GatewayPaymentStatus, amount: Cedis) -> Self {
        Self { status, amount }
    }
}

impl PaymentGateway for StubGateway {
    async fn verify(&self, _reference: &str) -> Result<GatewayVerification, GatewayError> {
        Ok(GatewayVerification { status: self.status, amount: self.amount, message: "stub verification".to_string() })
    }
}
