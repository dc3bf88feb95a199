use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{FulfillmentTracking, OrderId, TrackingStatus},
    sqlite::db::is_unique_violation,
    traits::PipelineError,
};

/// Creates the tracking record for a dispatch, or returns `None` if an active record already exists. The partial
/// unique index on active rows makes this safe even when two callers pass the pre-check simultaneously.
pub(crate) async fn create(
    order_id: &OrderId,
    max_attempts: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTracking>, PipelineError> {
    if let Some(active) = active_for_order(order_id, &mut *conn).await? {
        trace!("📦️ Order {order_id} already has active tracking record {}; skipping create", active.id);
        return Ok(None);
    }
    let result = sqlx::query_as(
        "INSERT INTO fulfillment_tracking (order_id, max_attempts) VALUES ($1, $2) RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(max_attempts)
    .fetch_one(conn)
    .await;
    match result {
        Ok(tracking) => Ok(Some(tracking)),
        Err(e) if is_unique_violation(&e) => {
            debug!("📦️ Lost the tracking-create race for order {order_id}. Treating as already handled.");
            Ok(None)
        },
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn active_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTracking>, PipelineError> {
    let tracking = sqlx::query_as(
        "SELECT * FROM fulfillment_tracking WHERE order_id = $1 AND status IN ('Pending', 'Sent')",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(tracking)
}

/// The most recent tracking record for the order, active or not.
pub(crate) async fn latest_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTracking>, PipelineError> {
    let tracking = sqlx::query_as(
        "SELECT * FROM fulfillment_tracking WHERE order_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(tracking)
}

/// The provider accepted the dispatch: count the attempt and move to `Sent`.
pub(crate) async fn record_sent(
    order_id: &OrderId,
    provider_ref: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<FulfillmentTracking, PipelineError> {
    let tracking: Option<FulfillmentTracking> = sqlx::query_as(
        "UPDATE fulfillment_tracking SET attempts = attempts + 1, status = 'Sent', provider_ref = COALESCE($2, \
         provider_ref), next_retry_at = NULL, last_error = NULL, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 \
         AND status IN ('Pending', 'Sent') RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(provider_ref)
    .fetch_optional(conn)
    .await?;
    tracking.ok_or_else(|| PipelineError::TrackingNotFound(order_id.clone()))
}

/// A failed attempt. With a retry time the record stays active; without one it goes terminal.
pub(crate) async fn record_failure(
    order_id: &OrderId,
    error: &str,
    next_retry_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<FulfillmentTracking, PipelineError> {
    let new_status = if next_retry_at.is_some() { TrackingStatus::Pending } else { TrackingStatus::Failed };
    let tracking: Option<FulfillmentTracking> = sqlx::query_as(
        "UPDATE fulfillment_tracking SET attempts = attempts + 1, status = $2, last_error = $3, next_retry_at = $4, \
         updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND status IN ('Pending', 'Sent') RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(new_status.to_string())
    .bind(error)
    .bind(next_retry_at)
    .fetch_optional(conn)
    .await?;
    tracking.ok_or_else(|| PipelineError::TrackingNotFound(order_id.clone()))
}

/// Non-terminal provider webhook states (`order.pending`, `order.processing`) only update the tracking status.
pub(crate) async fn update_status(
    order_id: &OrderId,
    status: TrackingStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTracking>, PipelineError> {
    let tracking = sqlx::query_as(
        "UPDATE fulfillment_tracking SET status = $2, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND status \
         IN ('Pending', 'Sent') RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(status.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(tracking)
}

/// Marks the active tracking record delivered. `None` when there is no active record left to claim.
pub(crate) async fn mark_delivered(
    order_id: &OrderId,
    provider_ref: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<FulfillmentTracking>, PipelineError> {
    let tracking = sqlx::query_as(
        "UPDATE fulfillment_tracking SET status = 'Delivered', provider_ref = COALESCE($2, provider_ref), \
         next_retry_at = NULL, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND status != 'Delivered' \
         RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(provider_ref)
    .fetch_optional(conn)
    .await?;
    Ok(tracking)
}

/// Active records whose retry time has passed and that still have attempts left.
pub(crate) async fn due_retries(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<FulfillmentTracking>, PipelineError> {
    let rows = sqlx::query_as(
        "SELECT * FROM fulfillment_tracking WHERE status = 'Pending' AND next_retry_at IS NOT NULL AND next_retry_at \
         <= $1 AND attempts < max_attempts ORDER BY next_retry_at ASC",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
