//! Consolidated database models
//!
//! All database entity structs organized by domain sections.

use std::{fmt, io, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::BigDecimal, FromRow};
use uuid::Uuid;

// =============================================================================
// REWARD DOMAIN
// =============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Reward {
    pub id: Uuid,
    pub user_id: String,
    pub symbol: String,
    pub quantity: BigDecimal,
    pub timestamp: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl Reward {
    /// Whether the grant still counts towards holdings at `as_of`.
    ///
    /// A reversal takes effect from the instant it committed. Reversed rows
    /// that predate the `reversed_at` column never count.
    pub fn is_held_at(&self, as_of: &DateTime<Utc>) -> bool {
        if self.timestamp > *as_of {
            return false;
        }

        match Reward_Status::from_str(&self.status) {
            Ok(Reward_Status::Completed) => true,
            Ok(Reward_Status::Reversed) => match self.reversed_at {
                Some(reversed_at) => reversed_at > *as_of,
                None => false,
            },
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reward_Status {
    Completed,
    Reversed,
}

impl fmt::Display for Reward_Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reward_Status::Completed => write!(f, "COMPLETED"),
            Reward_Status::Reversed => write!(f, "REVERSED"),
        }
    }
}

impl From<Reward_Status> for String {
    fn from(value: Reward_Status) -> Self {
        value.to_string()
    }
}

impl FromStr for Reward_Status {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<Reward_Status, Self::Err> {
        match value {
            "COMPLETED" => Ok(Reward_Status::Completed),
            "REVERSED" => Ok(Reward_Status::Reversed),
            _ => Err(io::Error::other("Reward status not supported")),
        }
    }
}

/// Row returned by the reversal lock query.
#[derive(Debug, FromRow)]
pub struct Locked_Reward {
    pub status: String,
    pub user_id: String,
    pub symbol: String,
    pub quantity: BigDecimal,
}

// =============================================================================
// LEDGER DOMAIN
// =============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Ledger_Entry {
    pub id: Uuid,
    pub reward_id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub account_debit: String,
    pub account_credit: String,
    pub amount_inr: BigDecimal,
    pub stock_symbol: Option<String>,
    pub stock_quantity: Option<BigDecimal>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ledger_Account {
    CompanyCash,
    StockInventory,
    CompanyExpense,
}

impl fmt::Display for Ledger_Account {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Ledger_Account::CompanyCash => write!(f, "company_cash"),
            Ledger_Account::StockInventory => write!(f, "stock_inventory"),
            Ledger_Account::CompanyExpense => write!(f, "company_expense"),
        }
    }
}

impl From<Ledger_Account> for String {
    fn from(value: Ledger_Account) -> Self {
        value.to_string()
    }
}

// =============================================================================
// HOLDINGS & VALUATION DOMAIN
// =============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Holding {
    pub user_id: String,
    pub symbol: String,
    pub quantity: BigDecimal,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Price_History {
    pub symbol: String,
    pub price_inr: BigDecimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Daily_Valuation {
    pub user_id: String,
    pub date: NaiveDate,
    pub total_inr: BigDecimal,
}

// =============================================================================
// REFERENCE DOMAIN
// =============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}
