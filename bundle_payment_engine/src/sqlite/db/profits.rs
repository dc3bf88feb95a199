use bpg_common::Cedis;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, ProfitRecord},
    sqlite::db::is_unique_violation,
    traits::PipelineError,
};

pub(crate) async fn exists_for(
    order_id: &OrderId,
    shop_id: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, PipelineError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM profits WHERE order_id = $1 AND shop_id = $2")
            .bind(order_id.as_str())
            .bind(shop_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.is_some())
}

/// The shop's available balance, fully re-derived from source rows: the sum of credited profits minus the sum of
/// approved withdrawals. Never maintained as an incremental counter, so it self-heals after any missed update.
pub(crate) async fn available_balance(shop_id: i64, conn: &mut SqliteConnection) -> Result<Cedis, PipelineError> {
    let (balance,): (i64,) = sqlx::query_as(
        r#"
        SELECT (SELECT COALESCE(SUM(amount), 0) FROM profits WHERE shop_id = $1 AND status = 'Credited')
             - (SELECT COALESCE(SUM(amount), 0) FROM withdrawals WHERE shop_id = $1 AND status = 'Approved')
        "#,
    )
    .bind(shop_id)
    .fetch_one(conn)
    .await?;
    Ok(Cedis::from_pesewas(balance))
}

/// Inserts the profit record for an order, exactly once. A pre-existing row (pre-check or a lost race on the
/// unique index) yields `None` and leaves every balance untouched.
pub(crate) async fn idempotent_insert(
    shop_id: i64,
    order_id: &OrderId,
    amount: Cedis,
    conn: &mut SqliteConnection,
) -> Result<Option<ProfitRecord>, PipelineError> {
    if exists_for(order_id, shop_id, &mut *conn).await? {
        debug!("🗃️ Profit for order {order_id} / shop {shop_id} already credited. Skipping.");
        return Ok(None);
    }
    let balance_before = available_balance(shop_id, &mut *conn).await?;
    let balance_after = balance_before + amount;
    let result = sqlx::query_as(
        r#"
            INSERT INTO profits (shop_id, order_id, amount, balance_before, balance_after, status)
            VALUES ($1, $2, $3, $4, $5, 'Credited')
            RETURNING *;
        "#,
    )
    .bind(shop_id)
    .bind(order_id.as_str())
    .bind(amount.value())
    .bind(balance_before.value())
    .bind(balance_after.value())
    .fetch_one(conn)
    .await;
    match result {
        Ok(profit) => {
            debug!("🗃️ Profit of {amount} credited to shop {shop_id} for order {order_id}");
            Ok(Some(profit))
        },
        Err(e) if is_unique_violation(&e) => {
            debug!("🗃️ Lost the profit-insert race for order {order_id} / shop {shop_id}. Already credited.");
            Ok(None)
        },
        Err(e) => Err(e.into()),
    }
}
