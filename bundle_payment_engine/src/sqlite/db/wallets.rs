use bpg_common::Cedis;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{TransactionType, Wallet, WalletTransaction},
    traits::WalletError,
};

pub async fn fetch_wallet(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<Wallet>, WalletError> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(wallet)
}

/// Creates the wallet row with a zero balance if it does not exist yet, and returns it.
pub async fn ensure_wallet(user_id: i64, conn: &mut SqliteConnection) -> Result<Wallet, WalletError> {
    sqlx::query("INSERT OR IGNORE INTO wallets (user_id) VALUES ($1)").bind(user_id).execute(&mut *conn).await?;
    fetch_wallet(user_id, conn).await?.ok_or(WalletError::WalletNotFound(user_id))
}

/// Does a `Completed` ledger entry already exist for this (user, reference, type)?
pub async fn completed_tx_exists(
    user_id: i64,
    reference: &str,
    tx_type: TransactionType,
    conn: &mut SqliteConnection,
) -> Result<bool, WalletError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM wallet_transactions WHERE user_id = $1 AND reference = $2 AND tx_type = $3 AND status = \
         'Completed'",
    )
    .bind(user_id)
    .bind(reference)
    .bind(tx_type.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(row.is_some())
}

/// Applies a balance mutation as read-current -> compute -> conditional-write. The write is guarded on the balance
/// still being what we read; a miss means a concurrent mutation landed in between and the caller must re-read.
/// The ledger row is only inserted after the balance write succeeds.
///
/// Call this inside a transaction so that a conflict on the ledger insert rolls the balance write back too.
pub(crate) async fn apply_mutation(
    wallet: &Wallet,
    tx_type: TransactionType,
    amount: Cedis,
    reference: &str,
    memo: &str,
    conn: &mut SqliteConnection,
) -> Result<WalletTransaction, WalletError> {
    let (new_balance, new_credited, new_debited) = match tx_type {
        TransactionType::Credit => (wallet.balance + amount, wallet.total_credited + amount, wallet.total_debited),
        TransactionType::Debit => (wallet.balance - amount, wallet.total_credited, wallet.total_debited + amount),
    };
    let updated = sqlx::query(
        "UPDATE wallets SET balance = $1, total_credited = $2, total_debited = $3, updated_at = CURRENT_TIMESTAMP \
         WHERE user_id = $4 AND balance = $5",
    )
    .bind(new_balance.value())
    .bind(new_credited.value())
    .bind(new_debited.value())
    .bind(wallet.user_id)
    .bind(wallet.balance.value())
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(WalletError::ConcurrentModification);
    }
    let tx = sqlx::query_as(
        r#"
            INSERT INTO wallet_transactions (
                user_id,
                tx_type,
                amount,
                reference,
                balance_before,
                balance_after,
                memo,
                status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'Completed')
            RETURNING *;
        "#,
    )
    .bind(wallet.user_id)
    .bind(tx_type.to_string())
    .bind(amount.value())
    .bind(reference)
    .bind(wallet.balance.value())
    .bind(new_balance.value())
    .bind(memo)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if super::is_unique_violation(&e) {
            WalletError::DuplicateReference
        } else {
            e.into()
        }
    })?;
    debug!("🗃️ Wallet {} {tx_type} of {amount} applied. New balance: {new_balance}", wallet.user_id);
    Ok(tx)
}
