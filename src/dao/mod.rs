mod postgre;

pub use postgre::{
    get_path, DataBase, PoolOption, PoolType, QueryResult,
    DUPLICATE_ERROR,
};
