use std::fmt;

use async_trait::async_trait;
use bigdecimal::{num_bigint::BigInt, BigDecimal, ToPrimitive};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::{
    error::Error,
    helpers::MONEY_SCALE,
    model::{Price_History, Table},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: BigDecimal,
    pub observed_at: DateTime<Utc>,
}

/// Upstream price capability consumed by the grant engine and the ticker.
#[async_trait]
pub trait PriceOracle: Send + Sync + fmt::Debug {
    /// Price used to book a grant. Fails with [`Error::UpstreamPrice`].
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote, Error>;

    /// Records a fresh observation for every symbol, returns how many.
    async fn refresh(&self, symbols: &[String]) -> Result<usize, Error>;
}

/// Serves the latest stored observation while it is younger than `max_age`,
/// otherwise quotes a simulated price and records it in `price_history`.
#[derive(Debug)]
pub struct SimulatedPriceOracle {
    price_history: Table<Price_History>,
    max_age: TimeDelta,
    min_units: i64,
    max_units: i64,
}

impl SimulatedPriceOracle {
    pub fn new(
        price_history: Table<Price_History>,
        max_age_secs: u64,
        min_price: &BigDecimal,
        max_price: &BigDecimal,
    ) -> Result<SimulatedPriceOracle, Error> {
        let min_units = to_units(min_price)?;
        let max_units = to_units(max_price)?;

        if min_units <= 0 || min_units >= max_units {
            return Err(Error::ConfigurationError(format!(
                "simulated price range [{}, {}) is empty or not positive",
                min_price, max_price
            )));
        }

        let max_age = i64::try_from(max_age_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "price max age {}s out of range",
                    max_age_secs
                ))
            })?;

        Ok(SimulatedPriceOracle {
            price_history,
            max_age,
            min_units,
            max_units,
        })
    }

    /// Uniform in `[min, max)` with four decimal places.
    pub fn quote(&self) -> BigDecimal {
        let units = rand::thread_rng().gen_range(self.min_units..self.max_units);
        BigDecimal::new(BigInt::from(units), MONEY_SCALE)
    }
}

#[async_trait]
impl PriceOracle for SimulatedPriceOracle {
    async fn get_price(&self, symbol: &str) -> Result<PriceQuote, Error> {
        let now = Utc::now();
        let latest = self.price_history.get_latest(symbol).await.map_err(
            |err| Error::UpstreamPrice {
                symbol: symbol.to_owned(),
                reason: err.to_string(),
            },
        )?;

        if let Some(item) = latest {
            if is_fresh(&item.timestamp, &now, &self.max_age) {
                return Ok(PriceQuote {
                    price: item.price_inr,
                    observed_at: item.timestamp,
                });
            }
        }

        let observation = Price_History {
            symbol: symbol.to_owned(),
            price_inr: self.quote(),
            timestamp: now,
        };

        self.price_history.insert(&observation).await.map_err(|err| {
            warn!("Could not record price for {}: {}", symbol, err);
            Error::UpstreamPrice {
                symbol: symbol.to_owned(),
                reason: err.to_string(),
            }
        })?;

        debug!("Quoted {} at {}", symbol, observation.price_inr);

        Ok(PriceQuote {
            price: observation.price_inr,
            observed_at: observation.timestamp,
        })
    }

    async fn refresh(&self, symbols: &[String]) -> Result<usize, Error> {
        let timestamp = Utc::now();
        let observations = symbols
            .iter()
            .map(|symbol| Price_History {
                symbol: symbol.to_owned(),
                price_inr: self.quote(),
                timestamp,
            })
            .collect::<Vec<Price_History>>();

        self.price_history.insert_many(&observations).await?;

        Ok(observations.len())
    }
}

pub fn is_fresh(
    observed_at: &DateTime<Utc>,
    now: &DateTime<Utc>,
    max_age: &TimeDelta,
) -> bool {
    *now - *observed_at < *max_age
}

fn to_units(value: &BigDecimal) -> Result<i64, Error> {
    let scaled = value.with_scale(MONEY_SCALE) * BigDecimal::from(10_000);
    scaled.to_i64().ok_or_else(|| {
        Error::ConfigurationError(format!("price {} out of range", value))
    })
}
