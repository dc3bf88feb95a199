use bpg_common::Cedis;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Shop, Withdrawal, WithdrawalStatus},
    traits::PipelineError,
};

pub async fn fetch_shop(shop_id: i64, conn: &mut SqliteConnection) -> Result<Option<Shop>, PipelineError> {
    let shop = sqlx::query_as("SELECT * FROM shops WHERE id = $1").bind(shop_id).fetch_optional(conn).await?;
    Ok(shop)
}

pub async fn insert_shop(
    name: &str,
    parent_shop_id: Option<i64>,
    parent_commission: Cedis,
    conn: &mut SqliteConnection,
) -> Result<Shop, PipelineError> {
    let shop = sqlx::query_as(
        "INSERT INTO shops (name, parent_shop_id, parent_commission) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(name)
    .bind(parent_shop_id)
    .bind(parent_commission.value())
    .fetch_one(conn)
    .await?;
    Ok(shop)
}

pub async fn record_withdrawal(
    shop_id: i64,
    amount: Cedis,
    status: WithdrawalStatus,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, PipelineError> {
    let withdrawal = sqlx::query_as(
        "INSERT INTO withdrawals (shop_id, amount, status) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(shop_id)
    .bind(amount.value())
    .bind(status.to_string())
    .fetch_one(conn)
    .await?;
    Ok(withdrawal)
}
