use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::models::{NewRewardTx, RewardTx, RewardTxType};
use crate::repo::{Repositories, RewardTxRepo};

/// Append-only diamond ledger. Balances are always recomputed from entries.
pub struct RewardService {
    rewards: Arc<dyn RewardTxRepo>,
}

impl RewardService {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            rewards: repos.rewards.clone(),
        }
    }

    pub async fn award_diamonds(
        &self,
        user_id: i64,
        amount: i64,
        reason: &str,
        attempt_id: Option<i64>,
    ) -> CoreResult<RewardTx> {
        if amount <= 0 {
            return Err(CoreError::Validation(
                "amount must be positive".to_string(),
            ));
        }

        let tx = self
            .rewards
            .append(NewRewardTx {
                user_id,
                amount,
                tx_type: RewardTxType::Earn,
                reason: reason.to_string(),
                attempt_id,
            })
            .await?;

        tracing::info!(
            user_id,
            amount,
            tx_id = tx.id,
            "Diamonds awarded: {}",
            reason
        );
        Ok(tx)
    }

    pub async fn spend_diamonds(
        &self,
        user_id: i64,
        amount: i64,
        reason: &str,
    ) -> CoreResult<RewardTx> {
        if amount <= 0 {
            return Err(CoreError::Validation(
                "amount must be positive".to_string(),
            ));
        }

        if !self.has_enough_diamonds(user_id, amount).await? {
            return Err(CoreError::forbidden("insufficient funds"));
        }

        let tx = self
            .rewards
            .append(NewRewardTx {
                user_id,
                amount: -amount,
                tx_type: RewardTxType::Spend,
                reason: reason.to_string(),
                attempt_id: None,
            })
            .await?;

        tracing::info!(user_id, amount, tx_id = tx.id, "Diamonds spent: {}", reason);
        Ok(tx)
    }

    pub async fn balance(&self, user_id: i64) -> CoreResult<i64> {
        Ok(self.rewards.balance(user_id).await?)
    }

    pub async fn has_enough_diamonds(&self, user_id: i64, amount: i64) -> CoreResult<bool> {
        Ok(self.balance(user_id).await? >= amount)
    }

    pub async fn transaction_history(
        &self,
        user_id: i64,
        tx_type: Option<RewardTxType>,
    ) -> CoreResult<Vec<RewardTx>> {
        Ok(self.rewards.list_for_user(user_id, tx_type).await?)
    }
}
