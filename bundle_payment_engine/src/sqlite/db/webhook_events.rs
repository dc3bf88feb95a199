use sqlx::SqliteConnection;

use crate::{db_types::WebhookEventRecord, traits::PipelineError};

/// Appends the raw payload to the audit log. Rows are never updated or deleted.
pub(crate) async fn insert(
    event_type: &str,
    provider_ref: Option<&str>,
    payload: &str,
    conn: &mut SqliteConnection,
) -> Result<WebhookEventRecord, PipelineError> {
    let event = sqlx::query_as(
        "INSERT INTO webhook_events (event_type, provider_ref, payload) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(event_type)
    .bind(provider_ref)
    .bind(payload)
    .fetch_one(conn)
    .await?;
    Ok(event)
}

pub async fn events_for_ref(
    provider_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEventRecord>, PipelineError> {
    let events = sqlx::query_as("SELECT * FROM webhook_events WHERE provider_ref = $1 ORDER BY id ASC")
        .bind(provider_ref)
        .fetch_all(conn)
        .await?;
    Ok(events)
}
