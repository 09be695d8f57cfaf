use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RewardTxType {
    Earn,
    Spend,
    Bonus,
}

impl RewardTxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardTxType::Earn => "earn",
            RewardTxType::Spend => "spend",
            RewardTxType::Bonus => "bonus",
        }
    }
}

impl FromStr for RewardTxType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "earn" => Ok(RewardTxType::Earn),
            "spend" => Ok(RewardTxType::Spend),
            "bonus" => Ok(RewardTxType::Bonus),
            _ => Err(format!("Invalid transaction type: {}", value)),
        }
    }
}

/// Signed ledger entry: positive amounts credit, negative amounts debit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardTx {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    #[serde(rename = "type")]
    pub tx_type: RewardTxType,
    pub reason: String,
    pub attempt_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRewardTx {
    pub user_id: i64,
    pub amount: i64,
    pub tx_type: RewardTxType,
    pub reason: String,
    pub attempt_id: Option<i64>,
}

impl NewRewardTx {
    pub fn into_tx(self, id: i64, created_at: DateTime<Utc>) -> RewardTx {
        RewardTx {
            id,
            user_id: self.user_id,
            amount: self.amount,
            tx_type: self.tx_type,
            reason: self.reason,
            attempt_id: self.attempt_id,
            created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub diamonds: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
}
