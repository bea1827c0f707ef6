use std::{env, fs, io::ErrorKind, ops::Deref, str::FromStr, sync::Arc};

use bigdecimal::BigDecimal;
use tracing::warn;

use crate::{
    dao::get_path,
    error::Error,
    helpers::parse_tuple_string,
    model::Stock,
    provider::{DatabasePool, PriceOracle, SimulatedPriceOracle},
};

pub const DEFAULT_PRICE_UPDATE_INTERVAL: u64 = 3600;

#[derive(Debug)]
pub struct AppState<T>(Arc<T>);

impl<T> AppState<T> {
    pub fn new(state: T) -> AppState<T> {
        AppState(Arc::new(state))
    }
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> AppState<T> {
        AppState(Arc::clone(&self.0))
    }
}

impl<T> Deref for AppState<T> {
    type Target = Arc<T>;

    fn deref(&self) -> &Arc<T> {
        &self.0
    }
}

#[derive(Debug)]
pub struct State {
    pub config: Config,
    pub database: DatabasePool,
    pub price_oracle: Arc<dyn PriceOracle>,
}

impl State {
    pub async fn new(
        config: Config,
        database: DatabasePool,
    ) -> Result<State, Error> {
        Self::init_migrations(&database).await?;
        Self::init_stocks(&config.seed_stocks, &database).await?;

        let price_oracle = SimulatedPriceOracle::new(
            database.price_history.clone(),
            config.price_max_age,
            &config.simulated_price_min,
            &config.simulated_price_max,
        )?;

        Ok(Self {
            config,
            database,
            price_oracle: Arc::new(price_oracle),
        })
    }

    pub async fn init_migrations(database: &DatabasePool) -> Result<(), Error> {
        let files = vec![
            "users.sql",
            "stocks.sql",
            "rewards.sql",
            "ledger_entries.sql",
            "holdings.sql",
            "price_history.sql",
            "daily_valuations.sql",
        ];

        let dir = env!("CARGO_MANIFEST_DIR");

        for file in files {
            let data = fs::read_to_string(get_path(dir, file))?;
            sqlx::raw_sql(data.as_str()).execute(&database.pool).await?;
        }

        Ok(())
    }

    async fn init_stocks(
        stocks: &Vec<Stock>,
        database: &DatabasePool,
    ) -> Result<(), Error> {
        let mut tx = database.pool.begin().await?;

        for stock in stocks {
            database.stock.insert_if_not_exists(stock, &mut tx).await?;
        }

        tx.commit().await?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub max_connections: u32,
    pub timeout: u64,
    pub price_update_interval: u64,
    pub price_max_age: u64,
    pub simulated_price_min: BigDecimal,
    pub simulated_price_max: BigDecimal,
    pub seed_stocks: Vec<Stock>,
}

pub fn get_configuration() -> Result<Config, Error> {
    let database_url = env::var("DATABASE_URL")?;
    let server_host = env::var("SERVER_HOST")?;
    let port: u16 = env::var("PORT")?.parse()?;
    let allowed_origins = env::var("ALLOWED_ORIGINS")?
        .split(',')
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect::<Vec<String>>();
    let max_connections: u32 = env::var("MAX_CONNECTIONS")?.parse()?;
    let timeout: u64 = env::var("TIMEOUT")?.parse()?;
    let price_update_interval =
        parse_interval(env::var("PRICE_UPDATE_INTERVAL").ok());
    let price_max_age: u64 = env::var("PRICE_MAX_AGE")?.parse()?;
    let simulated_price_min =
        BigDecimal::from_str(&env::var("SIMULATED_PRICE_MIN")?)?;
    let simulated_price_max =
        BigDecimal::from_str(&env::var("SIMULATED_PRICE_MAX")?)?;
    let seed_stocks = get_seed_stocks(env::var("SEED_STOCKS")?)?;

    let config = Config {
        database_url,
        server_host,
        port,
        allowed_origins,
        max_connections,
        timeout,
        price_update_interval,
        price_max_age,
        simulated_price_min,
        simulated_price_max,
        seed_stocks,
    };

    Ok(config)
}

/// Loads `.env` (optional) and `ledger.conf` into the process environment.
/// Variables already set in the environment are never overwritten, so `.env`
/// takes precedence over `ledger.conf`.
pub fn set_configuration() -> Result<(), Error> {
    let config_file: &str = ".env";
    let ledger_config_file: &str = "ledger.conf";

    let directory = env!("CARGO_MANIFEST_DIR");
    let path = format!("{}/{}", directory, config_file);
    let ledger_config_path = format!("{}/{}", directory, ledger_config_file);

    match fs::read_to_string(path) {
        Ok(config_string) => parse_config_string(config_string),
        Err(err) if err.kind() == ErrorKind::NotFound => {},
        Err(err) => return Err(Error::Io(err)),
    }

    let ledger_config_string = fs::read_to_string(ledger_config_path)?;
    parse_config_string(ledger_config_string);

    Ok(())
}

fn parse_config_string(config: String) {
    let params = config
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()));

    for (key, value) in params {
        if env::var_os(key).is_none() {
            env::set_var(key, value);
        }
    }
}

/// Seconds between price refreshes. Missing, unparsable or zero values fall
/// back to the default.
pub fn parse_interval(value: Option<String>) -> u64 {
    match value.as_deref().map(|v| v.trim().parse::<u64>()) {
        Some(Ok(seconds)) if seconds > 0 => seconds,
        Some(_) => {
            warn!(
                "Invalid PRICE_UPDATE_INTERVAL, using {} seconds",
                DEFAULT_PRICE_UPDATE_INTERVAL
            );
            DEFAULT_PRICE_UPDATE_INTERVAL
        },
        None => DEFAULT_PRICE_UPDATE_INTERVAL,
    }
}

fn get_seed_stocks(data: String) -> Result<Vec<Stock>, Error> {
    let mut stocks = vec![];

    for item in parse_tuple_string(data) {
        let (symbol, name) = item.split_once(',').ok_or_else(|| {
            Error::ConfigurationError(format!(
                "SEED_STOCKS entry ({}) must be (SYMBOL,Name)",
                item
            ))
        })?;

        stocks.push(Stock {
            symbol: symbol.trim().to_owned(),
            name: name.trim().to_owned(),
        });
    }

    Ok(stocks)
}
