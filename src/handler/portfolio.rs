use std::{collections::BTreeMap, str::FromStr};

use bigdecimal::{BigDecimal, Zero};
use chrono::{Days, NaiveDate};
use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::{
    error::Error,
    helpers::{round_money, start_of_day},
    model::{Holding, Price_History, Reward, Reward_Status},
    provider::DatabasePool,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio_Item {
    pub symbol: String,
    pub quantity: BigDecimal,
    pub current_price: BigDecimal,
    pub current_value: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub items: Vec<Portfolio_Item>,
    pub total_inr: BigDecimal,
}

/// Current holdings valued at the latest recorded price of each symbol.
pub async fn portfolio(
    database: &DatabasePool,
    user_id: &str,
) -> Result<Portfolio, Error> {
    let holdings = database
        .holding
        .get_by_user(user_id)
        .await?
        .into_iter()
        .filter(|holding| !holding.quantity.is_zero())
        .collect::<Vec<Holding>>();

    let joins = holdings
        .iter()
        .map(|holding| database.price_history.get_latest(&holding.symbol));

    let mut prices = vec![];
    for result in join_all(joins).await {
        prices.push(result?);
    }

    Ok(value_holdings(holdings, prices))
}

pub fn value_holdings(
    holdings: Vec<Holding>,
    prices: Vec<Option<Price_History>>,
) -> Portfolio {
    let mut items = vec![];
    let mut total = BigDecimal::zero();

    for (holding, price) in holdings.into_iter().zip(prices) {
        let price = match price {
            Some(price) => price.price_inr,
            None => {
                warn!(
                    "No price for {}, left out of portfolio of {}",
                    holding.symbol, holding.user_id
                );
                continue;
            },
        };

        let value = round_money(&(&holding.quantity * &price));
        total += &value;

        items.push(Portfolio_Item {
            symbol: holding.symbol,
            quantity: holding.quantity,
            current_price: price,
            current_value: value,
        });
    }

    Portfolio {
        items,
        total_inr: round_money(&total),
    }
}

/// Rewards granted during `today` (UTC), any status.
pub async fn today_rewards(
    database: &DatabasePool,
    user_id: &str,
    today: NaiveDate,
) -> Result<Vec<Reward>, Error> {
    let from = start_of_day(today);
    let to = match today.checked_add_days(Days::new(1)) {
        Some(next) => start_of_day(next),
        None => {
            return Err(Error::Validation(format!("date {} out of range", today)))
        },
    };

    let rewards = database
        .reward
        .get_by_user_between(user_id, from, to)
        .await?;

    Ok(rewards)
}

/// Total granted quantity per symbol, reversed rewards excluded.
pub fn shares_by_symbol(rewards: &[Reward]) -> BTreeMap<String, BigDecimal> {
    let mut shares: BTreeMap<String, BigDecimal> = BTreeMap::new();

    for reward in rewards {
        if Reward_Status::from_str(&reward.status).ok()
            != Some(Reward_Status::Completed)
        {
            continue;
        }

        *shares
            .entry(reward.symbol.to_owned())
            .or_insert_with(BigDecimal::zero) += &reward.quantity;
    }

    shares
}
