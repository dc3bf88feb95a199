use bpg_common::Cedis;
use log::*;

use crate::{
    db_types::{Wallet, WalletTransaction},
    traits::{PaymentPipelineDatabase, WalletError},
};

/// `WalletApi` handles balance queries and top-ups for user wallets. Debits are driven by the order flow and live
/// in [`super::OrderFlowApi`].
#[derive(Debug, Clone)]
pub struct WalletApi<B> {
    db: B,
}

impl<B> WalletApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> WalletApi<B>
where B: PaymentPipelineDatabase
{
    pub async fn fetch_wallet(&self, user_id: i64) -> Result<Option<Wallet>, WalletError> {
        self.db.fetch_wallet(user_id).await
    }

    pub async fn balance(&self, user_id: i64) -> Result<Cedis, WalletError> {
        let wallet = self.db.fetch_wallet(user_id).await?.ok_or(WalletError::WalletNotFound(user_id))?;
        Ok(wallet.balance)
    }

    /// Credits a wallet top-up, idempotently with respect to `reference`. Returns `None` when the reference was
    /// already credited, which lets gateway webhooks and reconciliation both call this without double-crediting.
    pub async fn top_up(
        &self,
        user_id: i64,
        amount: Cedis,
        reference: &str,
    ) -> Result<Option<WalletTransaction>, WalletError> {
        let entry = self.db.credit_wallet(user_id, amount, reference, "Wallet top-up").await?;
        match &entry {
            Some(tx) => info!("🔄️💰️ Top-up [{reference}] of {amount} credited to user {user_id} (tx #{})", tx.id),
            None => debug!("🔄️💰️ Top-up [{reference}] for user {user_id} was already credited. No-op."),
        }
        Ok(entry)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
