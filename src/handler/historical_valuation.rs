use std::collections::{BTreeMap, BTreeSet};

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::Transaction;
use tracing::{debug, info, warn};

use crate::{
    dao::DataBase,
    error::Error,
    helpers::{end_of_day, finalized_days, round_money},
    model::{Daily_Valuation, Price_History, Reward},
    provider::DatabasePool,
};

/// As-of price lookups over a preloaded set of observations.
#[derive(Debug, Default)]
pub struct PriceBook {
    series: BTreeMap<String, Vec<(DateTime<Utc>, BigDecimal)>>,
}

impl PriceBook {
    pub fn new(observations: &[Price_History]) -> PriceBook {
        let mut series: BTreeMap<String, Vec<(DateTime<Utc>, BigDecimal)>> =
            BTreeMap::new();

        for item in observations {
            series
                .entry(item.symbol.to_owned())
                .or_default()
                .push((item.timestamp, item.price_inr.to_owned()));
        }

        // same-instant observations resolve to the higher price
        for points in series.values_mut() {
            points.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        }

        PriceBook { series }
    }

    /// Latest observed price at or before `as_of`.
    pub fn price_as_of(
        &self,
        symbol: &str,
        as_of: &DateTime<Utc>,
    ) -> Option<&BigDecimal> {
        let points = self.series.get(symbol)?;
        let index = points.partition_point(|(timestamp, _)| timestamp <= as_of);

        match index {
            0 => None,
            _ => Some(&points[index - 1].1),
        }
    }
}

/// Values the user's holdings at the end of each of `days`.
///
/// Holdings come from the rewards active at the close of the day, priced at
/// the latest observation up to that instant. A symbol without any such
/// observation adds nothing to the total.
pub fn reconstruct_days(
    user_id: &str,
    rewards: &[Reward],
    observations: &[Price_History],
    days: &[NaiveDate],
) -> Vec<Daily_Valuation> {
    let book = PriceBook::new(observations);
    let mut unpriced: BTreeSet<&str> = BTreeSet::new();
    let mut valuations = Vec::with_capacity(days.len());

    for day in days {
        let as_of = end_of_day(*day);
        let mut quantities: BTreeMap<&str, BigDecimal> = BTreeMap::new();

        for reward in rewards.iter().filter(|r| r.is_held_at(&as_of)) {
            *quantities
                .entry(reward.symbol.as_str())
                .or_insert_with(BigDecimal::zero) += &reward.quantity;
        }

        let mut total = BigDecimal::zero();

        for (symbol, quantity) in quantities {
            if quantity.is_zero() {
                continue;
            }

            match book.price_as_of(symbol, &as_of) {
                Some(price) => total += quantity * price,
                None => {
                    if unpriced.insert(symbol) {
                        warn!(
                            "No price for {} as of {}, valued at zero",
                            symbol, day
                        );
                    } else {
                        debug!("No price for {} as of {}", symbol, day);
                    }
                },
            }
        }

        valuations.push(Daily_Valuation {
            user_id: user_id.to_owned(),
            date: *day,
            total_inr: round_money(&total),
        });
    }

    valuations
}

#[derive(Debug)]
pub struct ValuationHistory<'a> {
    database: &'a DatabasePool,
}

impl<'a> ValuationHistory<'a> {
    pub fn new(database: &'a DatabasePool) -> ValuationHistory<'a> {
        ValuationHistory { database }
    }

    pub async fn daily_valuations(
        &self,
        user_id: &str,
    ) -> Result<Vec<Daily_Valuation>, Error> {
        self.daily_valuations_at(user_id, Utc::now().date_naive())
            .await
    }

    /// Valuations for every finalized day before `today`, from the cache when
    /// it covers the whole range.
    pub async fn daily_valuations_at(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Daily_Valuation>, Error> {
        let first = match self.database.reward.get_first_timestamp(user_id).await?
        {
            Some(first) => first,
            None => return Ok(vec![]),
        };

        let days = finalized_days(first.date_naive(), today);
        let (from, to) = match (days.first(), days.last()) {
            (Some(from), Some(to)) => (*from, *to),
            _ => return Ok(vec![]),
        };

        let cached = self
            .database
            .daily_valuation
            .get_between(user_id, from, to)
            .await?;

        if cached.len() == days.len() {
            debug!("Serving {} cached valuations for {}", cached.len(), user_id);
            return Ok(cached);
        }

        info!(
            "Valuation cache miss for {}: {} of {} days cached",
            user_id,
            cached.len(),
            days.len()
        );

        self.materialize(user_id, today).await
    }

    /// Recomputes from rewards and price history without touching the cache.
    pub async fn reconstruct(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Daily_Valuation>, Error> {
        let mut tx = self.database.pool.begin().await?;
        let valuations = self.reconstruct_in(user_id, today, &mut tx).await?;
        tx.commit().await?;

        Ok(valuations)
    }

    async fn materialize(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Daily_Valuation>, Error> {
        let mut tx = self.database.pool.begin().await?;

        self.database
            .daily_valuation
            .lock_user(user_id, &mut tx)
            .await?;

        let valuations = self.reconstruct_in(user_id, today, &mut tx).await?;

        if let Err(err) = self.store(&valuations, tx).await {
            warn!("Could not cache valuations for {}: {}", user_id, err);
        }

        Ok(valuations)
    }

    async fn store(
        &self,
        valuations: &Vec<Daily_Valuation>,
        mut tx: Transaction<'_, DataBase>,
    ) -> Result<(), sqlx::Error> {
        self.database
            .daily_valuation
            .upsert_many(valuations, &mut tx)
            .await?;

        tx.commit().await
    }

    async fn reconstruct_in(
        &self,
        user_id: &str,
        today: NaiveDate,
        tx: &mut Transaction<'_, DataBase>,
    ) -> Result<Vec<Daily_Valuation>, Error> {
        let end = match today.checked_sub_days(Days::new(1)) {
            Some(end) => end,
            None => return Ok(vec![]),
        };
        let until = end_of_day(end);

        let rewards = self
            .database
            .reward
            .get_by_user_until(user_id, until, tx)
            .await?;

        let start = match rewards.iter().map(|r| r.timestamp).min() {
            Some(start) => start.date_naive(),
            None => return Ok(vec![]),
        };

        let mut symbols = rewards
            .iter()
            .map(|r| r.symbol.to_owned())
            .collect::<Vec<String>>();
        symbols.sort();
        symbols.dedup();

        let observations = self
            .database
            .price_history
            .get_by_symbols_until(&symbols, until, tx)
            .await?;

        let days = finalized_days(start, today);

        Ok(reconstruct_days(user_id, &rewards, &observations, &days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::str::FromStr;
    use uuid::Uuid;

    use crate::model::Reward_Status;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn reward(symbol: &str, quantity: &str, timestamp: DateTime<Utc>) -> Reward {
        Reward {
            id: Uuid::new_v4(),
            user_id: String::from("user-1"),
            symbol: symbol.to_owned(),
            quantity: dec(quantity),
            timestamp,
            idempotency_key: None,
            source: String::from("test"),
            created_at: timestamp,
            status: String::from(Reward_Status::Completed),
            reversed_at: None,
        }
    }

    fn price(symbol: &str, value: &str, timestamp: DateTime<Utc>) -> Price_History {
        Price_History {
            symbol: symbol.to_owned(),
            price_inr: dec(value),
            timestamp,
        }
    }

    #[test]
    fn test_price_book_as_of() {
        let book = PriceBook::new(&[
            price("TCS", "3600", at(9, 12)),
            price("TCS", "3500", at(8, 12)),
        ]);

        assert_eq!(book.price_as_of("TCS", &at(8, 11)), None);
        assert_eq!(book.price_as_of("TCS", &at(8, 12)), Some(&dec("3500")));
        assert_eq!(book.price_as_of("TCS", &at(9, 11)), Some(&dec("3500")));
        assert_eq!(book.price_as_of("TCS", &at(10, 0)), Some(&dec("3600")));
        assert_eq!(book.price_as_of("INFY", &at(10, 0)), None);
    }

    #[test]
    fn test_price_book_same_instant_is_order_independent() {
        let forward = PriceBook::new(&[
            price("TCS", "3500", at(9, 12)),
            price("TCS", "3550", at(9, 12)),
        ]);
        let backward = PriceBook::new(&[
            price("TCS", "3550", at(9, 12)),
            price("TCS", "3500", at(9, 12)),
        ]);

        assert_eq!(forward.price_as_of("TCS", &at(10, 0)), Some(&dec("3550")));
        assert_eq!(backward.price_as_of("TCS", &at(10, 0)), Some(&dec("3550")));
    }

    #[test]
    fn test_two_day_scenario() {
        let rewards = vec![
            reward("RELIANCE", "10", at(8, 10)),
            reward("TCS", "5", at(9, 11)),
        ];
        let observations = vec![
            price("RELIANCE", "2500", at(8, 9)),
            price("RELIANCE", "2600", at(9, 9)),
            price("TCS", "3500", at(9, 10)),
        ];
        let days = finalized_days(date(8), date(10));

        let valuations =
            reconstruct_days("user-1", &rewards, &observations, &days);

        assert_eq!(valuations.len(), 2);
        assert_eq!(valuations[0].date, date(8));
        assert_eq!(valuations[0].total_inr.to_string(), "25000.0000");
        assert_eq!(valuations[1].date, date(9));
        assert_eq!(valuations[1].total_inr.to_string(), "43500.0000");
    }

    #[test]
    fn test_missing_price_contributes_zero() {
        let rewards = vec![
            reward("RELIANCE", "2", at(8, 10)),
            reward("INFY", "3", at(8, 10)),
        ];
        let observations = vec![
            price("RELIANCE", "100", at(8, 9)),
            price("INFY", "1500", at(9, 9)),
        ];
        let days = finalized_days(date(8), date(10));

        let valuations =
            reconstruct_days("user-1", &rewards, &observations, &days);

        assert_eq!(valuations[0].total_inr, dec("200"));
        assert_eq!(valuations[1].total_inr, dec("4700"));
    }

    #[test]
    fn test_reversal_counts_until_reversed_at() {
        let mut reversed = reward("TCS", "4", at(7, 10));
        reversed.status = String::from(Reward_Status::Reversed);
        reversed.reversed_at = Some(at(8, 15));

        let mut legacy = reward("TCS", "100", at(7, 10));
        legacy.status = String::from(Reward_Status::Reversed);

        let rewards = vec![reversed, legacy, reward("TCS", "1", at(7, 11))];
        let observations = vec![price("TCS", "10", at(7, 0))];
        let days = finalized_days(date(7), date(9));

        let valuations =
            reconstruct_days("user-1", &rewards, &observations, &days);

        assert_eq!(valuations[0].total_inr, dec("50"));
        assert_eq!(valuations[1].total_inr, dec("10"));
    }

    #[test]
    fn test_reward_counts_from_its_day_only() {
        let rewards = vec![
            reward("TCS", "1", at(7, 10)),
            reward("TCS", "1", at(8, 23) + TimeDelta::minutes(59)),
        ];
        let observations = vec![price("TCS", "1000", at(7, 0))];
        let days = finalized_days(date(6), date(9));

        let valuations =
            reconstruct_days("user-1", &rewards, &observations, &days);

        let totals = valuations
            .iter()
            .map(|v| v.total_inr.to_owned())
            .collect::<Vec<BigDecimal>>();
        assert_eq!(totals, vec![dec("0"), dec("1000"), dec("2000")]);
    }

    #[test]
    fn test_reconstruction_is_deterministic() {
        let rewards = vec![
            reward("RELIANCE", "0.333333", at(8, 10)),
            reward("TCS", "1.5", at(8, 11)),
        ];
        let observations = vec![
            price("RELIANCE", "2499.9999", at(8, 9)),
            price("TCS", "3333.3333", at(8, 9)),
        ];
        let days = finalized_days(date(8), date(12));

        let first = reconstruct_days("user-1", &rewards, &observations, &days);
        let second = reconstruct_days("user-1", &rewards, &observations, &days);

        assert_eq!(first, second);
        assert!(first
            .iter()
            .all(|v| v.total_inr.as_bigint_and_exponent().1 == 4));
    }

    #[test]
    fn test_empty_inputs() {
        let days = finalized_days(date(8), date(10));

        let valuations = reconstruct_days("user-1", &[], &[], &days);
        assert!(valuations.iter().all(|v| v.total_inr.is_zero()));

        assert!(reconstruct_days("user-1", &[], &[], &[]).is_empty());
    }
}
