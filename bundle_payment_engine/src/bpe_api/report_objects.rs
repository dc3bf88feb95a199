use serde::{Deserialize, Serialize};

use crate::db_types::OrderId;

/// The outcome of a single order inside a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileItem {
    pub order_id: OrderId,
    /// What the gateway reported for the payment reference ("success", "failed", "abandoned", "pending"),
    /// or "error" when the gateway could not be consulted.
    pub gateway_status: String,
    /// What the reconciler did about it.
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a reconciliation sweep over stale pending orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub success: bool,
    /// Number of stale pending orders examined.
    pub total: usize,
    /// Orders the gateway confirmed as paid and that were settled in this run.
    pub verified: usize,
    /// Of the verified orders, how many were also dispatched to the provider.
    pub fulfilled: usize,
    /// Orders the gateway reported as failed or abandoned.
    pub failed: usize,
    /// Orders the gateway still reports as pending. Left untouched for the next sweep.
    pub still_pending: usize,
    pub results: Vec<ReconcileItem>,
}

impl ReconcileReport {
    pub fn empty() -> Self {
        Self { success: true, total: 0, verified: 0, fulfilled: 0, failed: 0, still_pending: 0, results: Vec::new() }
    }
}

/// One order's outcome inside a repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAction {
    pub order_id: OrderId,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a repair run. In dry-run mode `repaired` is always zero and `results` describes what *would* be done.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub dry_run: bool,
    pub examined: usize,
    pub repaired: usize,
    pub results: Vec<RepairAction>,
}

impl RepairReport {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run, examined: 0, repaired: 0, results: Vec::new() }
    }
}
