pub mod historical_valuation;
pub mod portfolio;
pub mod price_ticker;
pub mod reward_grant;
pub mod reward_reversal;
