use sqlx::{
    postgres::{PgPoolOptions, PgQueryResult},
    PgPool, Postgres,
};

pub type PoolType = PgPool;
pub type PoolOption = PgPoolOptions;
pub type QueryResult = PgQueryResult;
pub type DataBase = Postgres;

/// SQLSTATE raised by a unique constraint violation.
pub const DUPLICATE_ERROR: &str = "23505";
