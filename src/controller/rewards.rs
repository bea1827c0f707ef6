//! Reward grant and reversal endpoints.

use std::{str::FromStr, time::Duration};

use actix_web::{post, web, HttpResponse};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use uuid::Uuid;

use crate::{
    configuration::{AppState, State},
    error::Error,
    handler::{
        reward_grant::{RewardGrant, RewardLedger},
        reward_reversal::RewardReversal,
    },
};

const DEFAULT_SOURCE: &str = "api";

// =============================================================================
// Grant
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RewardRequest {
    pub idempotency_key: Option<String>,
    pub user_id: String,
    pub symbol: String,
    pub quantity: String,
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
}

impl RewardRequest {
    pub fn into_grant(self) -> Result<RewardGrant, Error> {
        let quantity = BigDecimal::from_str(self.quantity.trim())?;
        let source = match self.source {
            Some(source) if !source.trim().is_empty() => {
                source.trim().to_owned()
            },
            _ => String::from(DEFAULT_SOURCE),
        };

        Ok(RewardGrant {
            user_id: self.user_id,
            symbol: self.symbol,
            quantity,
            timestamp: self.timestamp,
            idempotency_key: self.idempotency_key,
            source,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardResponse {
    pub reward_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[post("/reward")]
pub async fn post_reward(
    state: web::Data<AppState<State>>,
    body: web::Json<RewardRequest>,
) -> Result<HttpResponse, Error> {
    let grant = body.into_inner().into_grant()?;
    let ledger = RewardLedger::new(&state.database);

    let receipt = timeout(
        Duration::from_secs(state.config.timeout),
        ledger.grant(grant, state.price_oracle.as_ref()),
    )
    .await??;

    if receipt.created {
        return Ok(HttpResponse::Created().json(RewardResponse {
            reward_id: receipt.reward_id,
            status: None,
        }));
    }

    Ok(HttpResponse::Ok().json(RewardResponse {
        reward_id: receipt.reward_id,
        status: Some(String::from("already_exists")),
    }))
}

// =============================================================================
// Reversal
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RevertResponse {
    pub status: String,
}

#[post("/reward/{id}/revert")]
pub async fn revert_reward(
    state: web::Data<AppState<State>>,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let reward_id = Uuid::parse_str(path.trim())?;
    let reversal = RewardReversal::new(&state.database);

    timeout(
        Duration::from_secs(state.config.timeout),
        reversal.reverse(reward_id),
    )
    .await??;

    Ok(HttpResponse::Ok().json(RevertResponse {
        status: String::from("reversed"),
    }))
}
