use std::str::FromStr;

use bpg_common::parse_boolean_flag;
use log::warn;
use sqlx::SqliteConnection;

use crate::{
    db_types::{FulfillmentSettings, Network},
    traits::PipelineError,
};

async fn fetch_value(key: &str, conn: &mut SqliteConnection) -> Result<Option<String>, PipelineError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = $1").bind(key).fetch_optional(conn).await?;
    Ok(row.map(|(v,)| v))
}

pub async fn set_value(key: &str, value: &str, conn: &mut SqliteConnection) -> Result<(), PipelineError> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = excluded.value, \
         updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

/// Reads the global fulfillment switches. Unknown network names in the stored list are logged and skipped rather
/// than failing the read.
pub(crate) async fn fulfillment_settings(conn: &mut SqliteConnection) -> Result<FulfillmentSettings, PipelineError> {
    let defaults = FulfillmentSettings::default();
    let enabled = parse_boolean_flag(fetch_value("auto_fulfill_enabled", &mut *conn).await?, true);
    let networks = match fetch_value("auto_networks", &mut *conn).await? {
        Some(csv) => csv
            .split(',')
            .filter_map(|s| {
                Network::from_str(s.trim())
                    .map_err(|e| warn!("🪛️ Ignoring invalid network in auto_networks setting: {e}"))
                    .ok()
            })
            .collect(),
        None => defaults.auto_networks.clone(),
    };
    let max_attempts = fetch_value("max_dispatch_attempts", &mut *conn)
        .await?
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(defaults.max_attempts);
    Ok(FulfillmentSettings { auto_fulfill_enabled: enabled, auto_networks: networks, max_attempts })
}
