//! Read-side endpoints over holdings, today's activity and valuation history.

use std::{collections::BTreeMap, time::Duration};

use actix_web::{get, web, Responder};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use uuid::Uuid;

use crate::{
    configuration::{AppState, State},
    error::Error,
    handler::{
        historical_valuation::ValuationHistory,
        portfolio::{portfolio, shares_by_symbol, today_rewards},
    },
    helpers::{to_fixed, MONEY_SCALE, QUANTITY_SCALE},
    model::Reward,
};

// =============================================================================
// Today
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TodayReward {
    pub id: Uuid,
    pub symbol: String,
    pub quantity: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

impl From<Reward> for TodayReward {
    fn from(reward: Reward) -> TodayReward {
        TodayReward {
            id: reward.id,
            symbol: reward.symbol,
            quantity: to_fixed(&reward.quantity, QUANTITY_SCALE),
            timestamp: reward.timestamp,
            status: reward.status,
        }
    }
}

#[get("/today-stocks/{user_id}")]
pub async fn today_stocks(
    state: web::Data<AppState<State>>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let today = Utc::now().date_naive();
    let rewards = timeout(
        Duration::from_secs(state.config.timeout),
        today_rewards(&state.database, &path, today),
    )
    .await??;

    let data = rewards
        .into_iter()
        .map(TodayReward::from)
        .collect::<Vec<TodayReward>>();

    Ok(web::Json(data))
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub shares_today: BTreeMap<String, String>,
    pub current_inr_value: String,
}

#[get("/stats/{user_id}")]
pub async fn stats(
    state: web::Data<AppState<State>>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let today = Utc::now().date_naive();
    let (rewards, holdings) = timeout(
        Duration::from_secs(state.config.timeout),
        async {
            tokio::try_join!(
                today_rewards(&state.database, &path, today),
                portfolio(&state.database, &path),
            )
        },
    )
    .await??;

    let shares_today = shares_by_symbol(&rewards)
        .into_iter()
        .map(|(symbol, quantity)| (symbol, to_fixed(&quantity, QUANTITY_SCALE)))
        .collect::<BTreeMap<String, String>>();

    Ok(web::Json(StatsResponse {
        shares_today,
        current_inr_value: to_fixed(&holdings.total_inr, MONEY_SCALE),
    }))
}

// =============================================================================
// Historical INR
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoricalValue {
    pub date: NaiveDate,
    pub inr_value: String,
}

#[get("/historical-inr/{user_id}")]
pub async fn historical_inr(
    state: web::Data<AppState<State>>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let history = ValuationHistory::new(&state.database);
    let valuations = timeout(
        Duration::from_secs(state.config.timeout),
        history.daily_valuations(&path),
    )
    .await??;

    let data = valuations
        .into_iter()
        .map(|item| HistoricalValue {
            date: item.date,
            inr_value: to_fixed(&item.total_inr, MONEY_SCALE),
        })
        .collect::<Vec<HistoricalValue>>();

    Ok(web::Json(data))
}

// =============================================================================
// Portfolio
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PortfolioItemResponse {
    pub symbol: String,
    pub quantity: String,
    pub current_price: String,
    pub current_value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub items: Vec<PortfolioItemResponse>,
    pub total_inr: String,
}

#[get("/portfolio/{user_id}")]
pub async fn get_portfolio(
    state: web::Data<AppState<State>>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let data = timeout(
        Duration::from_secs(state.config.timeout),
        portfolio(&state.database, &path),
    )
    .await??;

    let items = data
        .items
        .into_iter()
        .map(|item| PortfolioItemResponse {
            symbol: item.symbol,
            quantity: to_fixed(&item.quantity, QUANTITY_SCALE),
            current_price: to_fixed(&item.current_price, MONEY_SCALE),
            current_value: to_fixed(&item.current_value, MONEY_SCALE),
        })
        .collect::<Vec<PortfolioItemResponse>>();

    Ok(web::Json(PortfolioResponse {
        items,
        total_inr: to_fixed(&data.total_inr, MONEY_SCALE),
    }))
}
