use std::str::FromStr;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{error::Error, model::Reward_Status, provider::DatabasePool};

/// Reverses completed rewards. Ledger entries are left as the audit trail;
/// only the reward status and the holding change.
#[derive(Debug)]
pub struct RewardReversal<'a> {
    database: &'a DatabasePool,
}

impl<'a> RewardReversal<'a> {
    pub fn new(database: &'a DatabasePool) -> RewardReversal<'a> {
        RewardReversal { database }
    }

    pub async fn reverse(&self, reward_id: Uuid) -> Result<(), Error> {
        let mut tx = self.database.pool.begin().await?;

        let reward = self
            .database
            .reward
            .lock_for_update(reward_id, &mut tx)
            .await?
            .ok_or_else(|| Error::RewardNotFound(reward_id.to_string()))?;

        let status = Reward_Status::from_str(&reward.status)?;
        if status != Reward_Status::Completed {
            return Err(Error::RewardAlreadyReversed(reward_id.to_string()));
        }

        let now = Utc::now();

        self.database
            .reward
            .mark_reversed(reward_id, now, &mut tx)
            .await?;

        let result = self
            .database
            .holding
            .subtract_quantity(
                &reward.user_id,
                &reward.symbol,
                &reward.quantity,
                now,
                &mut tx,
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::InsufficientHolding {
                user_id: reward.user_id,
                symbol: reward.symbol,
                quantity: reward.quantity.to_string(),
            });
        }

        tx.commit().await?;

        info!(
            "Reward {} reversed: {} {} removed from {}",
            reward_id, reward.quantity, reward.symbol, reward.user_id
        );

        Ok(())
    }
}
