use sqlx::SqliteConnection;

use crate::traits::PipelineError;

pub(crate) async fn is_blacklisted(msisdn: &str, conn: &mut SqliteConnection) -> Result<bool, PipelineError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT msisdn FROM blacklist WHERE msisdn = $1").bind(msisdn).fetch_optional(conn).await?;
    Ok(row.is_some())
}

pub async fn add(msisdn: &str, reason: Option<&str>, conn: &mut SqliteConnection) -> Result<(), PipelineError> {
    sqlx::query("INSERT OR IGNORE INTO blacklist (msisdn, reason) VALUES ($1, $2)")
        .bind(msisdn)
        .bind(reason)
        .execute(conn)
        .await?;
    Ok(())
}
