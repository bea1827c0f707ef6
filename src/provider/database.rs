use crate::{
    configuration::Config,
    dao::{PoolOption, PoolType},
    error::Error,
    model::{
        Daily_Valuation, Holding, Ledger_Entry, Price_History, Reward, Stock,
        Table, User,
    },
};

#[derive(Debug)]
pub struct DatabasePool {
    pub reward: Table<Reward>,
    pub ledger_entry: Table<Ledger_Entry>,
    pub holding: Table<Holding>,
    pub price_history: Table<Price_History>,
    pub daily_valuation: Table<Daily_Valuation>,
    pub stock: Table<Stock>,
    pub user: Table<User>,
    pub pool: PoolType,
}

impl DatabasePool {
    pub async fn new(config: &Config) -> Result<DatabasePool, Error> {
        Self::connect(config.database_url.as_str(), config.max_connections)
            .await
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<DatabasePool, Error> {
        let pool = PoolOption::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PoolType) -> DatabasePool {
        DatabasePool {
            reward: Table::new(pool.clone()),
            ledger_entry: Table::new(pool.clone()),
            holding: Table::new(pool.clone()),
            price_history: Table::new(pool.clone()),
            daily_valuation: Table::new(pool.clone()),
            stock: Table::new(pool.clone()),
            user: Table::new(pool.clone()),
            pool,
        }
    }
}
