pub use self::{
    path::get_path,
    types::{
        DataBase, PoolOption, PoolType, QueryResult, DUPLICATE_ERROR,
    },
};
mod daily_valuation;
mod holding;
mod ledger_entry;
mod path;
mod price_history;
mod reward;
mod stock;
mod types;
mod user;
