pub use self::{
    database::DatabasePool,
    price_oracle::{PriceOracle, PriceQuote, SimulatedPriceOracle},
};

mod database;
mod price_oracle;
