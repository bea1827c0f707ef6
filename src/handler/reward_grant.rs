use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::DUPLICATE_ERROR,
    error::Error,
    helpers::{
        fee_rate, integer_digits, round_money, round_quantity,
        MAX_INPUT_SCALE, MAX_MONEY_INTEGER_DIGITS, MAX_QUANTITY_INTEGER_DIGITS,
    },
    model::{
        Ledger_Account, Ledger_Entry, Reward, Reward_Status, Stock, User,
    },
    provider::{DatabasePool, PriceOracle},
};

const MAX_USER_ID_LEN: usize = 128;
const MAX_SYMBOL_LEN: usize = 32;
const MAX_IDEMPOTENCY_KEY_LEN: usize = 256;
const MAX_SOURCE_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct RewardGrant {
    pub user_id: String,
    pub symbol: String,
    pub quantity: BigDecimal,
    pub timestamp: DateTime<Utc>,
    pub idempotency_key: Option<String>,
    pub source: String,
}

impl RewardGrant {
    /// Rounds the quantity to storage precision, maps a blank idempotency
    /// key to none and rejects anything the store would refuse.
    pub fn normalize(self) -> Result<RewardGrant, Error> {
        let user_id = self.user_id.trim().to_owned();
        let symbol = self.symbol.trim().to_owned();

        check_magnitude("quantity", &self.quantity, MAX_QUANTITY_INTEGER_DIGITS)?;
        let quantity = round_quantity(&self.quantity);
        check_magnitude("quantity", &quantity, MAX_QUANTITY_INTEGER_DIGITS)?;

        let idempotency_key = self
            .idempotency_key
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty());

        check_text("user_id", &user_id, MAX_USER_ID_LEN)?;
        check_text("symbol", &symbol, MAX_SYMBOL_LEN)?;

        if self.source.len() > MAX_SOURCE_LEN {
            return Err(Error::Validation(format!(
                "source longer than {} characters",
                MAX_SOURCE_LEN
            )));
        }

        if let Some(key) = &idempotency_key {
            check_text("idempotency_key", key, MAX_IDEMPOTENCY_KEY_LEN)?;
        }

        if quantity <= BigDecimal::zero() {
            return Err(Error::Validation(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }

        Ok(RewardGrant {
            user_id,
            symbol,
            quantity,
            timestamp: self.timestamp,
            idempotency_key,
            source: self.source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardReceipt {
    pub reward_id: Uuid,
    pub created: bool,
}

/// Cash side of a grant at a given price.
#[derive(Debug, Clone, PartialEq)]
pub struct CashOut {
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total: BigDecimal,
}

impl CashOut {
    pub fn new(quantity: &BigDecimal, price: &BigDecimal) -> CashOut {
        let amount = quantity * price;
        let fee = round_money(&(&amount * fee_rate()));
        let total = round_money(&(&amount + &fee));

        CashOut { amount, fee, total }
    }
}

/// The principal inventory purchase and, when a fee applies, the fee leg.
pub fn ledger_postings(
    reward_id: Uuid,
    symbol: &str,
    quantity: &BigDecimal,
    price: &BigDecimal,
    entry_time: DateTime<Utc>,
) -> Vec<Ledger_Entry> {
    let cash_out = CashOut::new(quantity, price);
    let mut entries = vec![Ledger_Entry {
        id: Uuid::new_v4(),
        reward_id,
        entry_time,
        account_debit: String::from(Ledger_Account::CompanyCash),
        account_credit: String::from(Ledger_Account::StockInventory),
        amount_inr: cash_out.total,
        stock_symbol: Some(symbol.to_owned()),
        stock_quantity: Some(round_quantity(quantity)),
        description: String::from("reward purchase"),
    }];

    if cash_out.fee > BigDecimal::zero() {
        entries.push(Ledger_Entry {
            id: Uuid::new_v4(),
            reward_id,
            entry_time,
            account_debit: String::from(Ledger_Account::CompanyExpense),
            account_credit: String::from(Ledger_Account::CompanyCash),
            amount_inr: cash_out.fee,
            stock_symbol: None,
            stock_quantity: None,
            description: String::from("fees for reward"),
        });
    }

    entries
}

/// Applies reward grants exactly once per idempotency key.
#[derive(Debug)]
pub struct RewardLedger<'a> {
    database: &'a DatabasePool,
}

impl<'a> RewardLedger<'a> {
    pub fn new(database: &'a DatabasePool) -> RewardLedger<'a> {
        RewardLedger { database }
    }

    /// Books a grant at the oracle's current price. Replays return before the
    /// oracle is consulted.
    pub async fn grant(
        &self,
        grant: RewardGrant,
        oracle: &dyn PriceOracle,
    ) -> Result<RewardReceipt, Error> {
        let grant = grant.normalize()?;

        if let Some(receipt) = self.find_replay(&grant.idempotency_key).await? {
            return Ok(receipt);
        }

        let quote = oracle.get_price(&grant.symbol).await?;

        self.apply_reward(grant, &quote.price).await
    }

    pub async fn apply_reward(
        &self,
        grant: RewardGrant,
        price: &BigDecimal,
    ) -> Result<RewardReceipt, Error> {
        let grant = grant.normalize()?;

        if *price <= BigDecimal::zero() {
            return Err(Error::Validation(format!(
                "price must be positive, got {}",
                price
            )));
        }

        check_magnitude("price", price, MAX_MONEY_INTEGER_DIGITS)?;

        let cash_out = CashOut::new(&grant.quantity, price);
        if integer_digits(&cash_out.total) > MAX_MONEY_INTEGER_DIGITS {
            return Err(Error::Validation(format!(
                "grant total {} exceeds {} integer digits",
                cash_out.total, MAX_MONEY_INTEGER_DIGITS
            )));
        }

        if let Some(receipt) = self.find_replay(&grant.idempotency_key).await? {
            return Ok(receipt);
        }

        let now = Utc::now();
        let reward = Reward {
            id: Uuid::new_v4(),
            user_id: grant.user_id,
            symbol: grant.symbol,
            quantity: grant.quantity,
            timestamp: grant.timestamp,
            idempotency_key: grant.idempotency_key,
            source: grant.source,
            created_at: now,
            status: String::from(Reward_Status::Completed),
            reversed_at: None,
        };

        let mut tx = self.database.pool.begin().await?;

        self.database
            .user
            .insert_if_not_exists(
                &User {
                    id: reward.user_id.to_owned(),
                    name: String::new(),
                },
                &mut tx,
            )
            .await?;
        self.database
            .stock
            .insert_if_not_exists(
                &Stock {
                    symbol: reward.symbol.to_owned(),
                    name: reward.symbol.to_owned(),
                },
                &mut tx,
            )
            .await?;

        if let Err(err) = self.database.reward.insert(&reward, &mut tx).await {
            drop(tx);

            if is_duplicate(&err) {
                if let Some(receipt) =
                    self.find_replay(&reward.idempotency_key).await?
                {
                    return Ok(receipt);
                }
            }

            return Err(Error::SQL(err));
        }

        let entries = ledger_postings(
            reward.id,
            &reward.symbol,
            &reward.quantity,
            price,
            now,
        );
        self.database
            .ledger_entry
            .insert_many(&entries, &mut tx)
            .await?;

        self.database
            .holding
            .add_quantity(
                &reward.user_id,
                &reward.symbol,
                &reward.quantity,
                now,
                &mut tx,
            )
            .await?;

        self.database
            .daily_valuation
            .lock_user(&reward.user_id, &mut tx)
            .await?;
        self.database
            .daily_valuation
            .delete_from(&reward.user_id, reward.timestamp.date_naive(), &mut tx)
            .await?;

        tx.commit().await?;

        info!(
            "Reward {} granted: {} {} to {} at {}",
            reward.id, reward.quantity, reward.symbol, reward.user_id, price
        );

        Ok(RewardReceipt {
            reward_id: reward.id,
            created: true,
        })
    }

    async fn find_replay(
        &self,
        idempotency_key: &Option<String>,
    ) -> Result<Option<RewardReceipt>, Error> {
        let key = match idempotency_key {
            Some(key) => key,
            None => return Ok(None),
        };

        let existing = self.database.reward.get_by_idempotency_key(key).await?;

        Ok(existing.map(|reward| {
            info!("Idempotent replay of {} resolved to {}", key, reward.id);
            RewardReceipt {
                reward_id: reward.id,
                created: false,
            }
        }))
    }
}

fn check_text(field: &str, value: &str, max_len: usize) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }

    if value.len() > max_len {
        return Err(Error::Validation(format!(
            "{} longer than {} characters",
            field, max_len
        )));
    }

    Ok(())
}

/// Bounds checked on the raw value, before any rounding expands it.
fn check_magnitude(
    field: &str,
    value: &BigDecimal,
    max_integer_digits: i64,
) -> Result<(), Error> {
    let (_, scale) = value.as_bigint_and_exponent();
    if scale > MAX_INPUT_SCALE {
        return Err(Error::Validation(format!(
            "{} has more than {} decimal places",
            field, MAX_INPUT_SCALE
        )));
    }

    if integer_digits(value) > max_integer_digits {
        return Err(Error::Validation(format!(
            "{} exceeds {} integer digits",
            field, max_integer_digits
        )));
    }

    Ok(())
}

fn is_duplicate(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(DUPLICATE_ERROR)
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn grant(quantity: &str, key: Option<&str>) -> RewardGrant {
        RewardGrant {
            user_id: String::from("user-1"),
            symbol: String::from("RELIANCE"),
            quantity: dec(quantity),
            timestamp: Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap(),
            idempotency_key: key.map(String::from),
            source: String::from("referral"),
        }
    }

    #[test]
    fn test_cash_out_includes_rounded_fee() {
        let cash_out = CashOut::new(&dec("10"), &dec("2500"));

        assert_eq!(cash_out.amount, dec("25000"));
        assert_eq!(cash_out.fee, dec("250"));
        assert_eq!(cash_out.total.to_string(), "25250.0000");
    }

    #[test]
    fn test_cash_out_fee_rounds_half_up() {
        let cash_out = CashOut::new(&dec("0.123457"), &dec("1234.5678"));
        let expected_fee = round_money(&(&cash_out.amount * dec("0.01")));

        assert_eq!(cash_out.fee, expected_fee);
        assert_eq!(cash_out.fee.as_bigint_and_exponent().1, 4);
        assert_eq!(cash_out.total, round_money(&(&cash_out.amount + &cash_out.fee)));
    }

    #[test]
    fn test_postings_are_principal_and_fee() {
        let reward_id = Uuid::new_v4();
        let at = Utc::now();
        let entries =
            ledger_postings(reward_id, "TCS", &dec("5"), &dec("3500"), at);

        assert_eq!(entries.len(), 2);

        let principal = &entries[0];
        assert_eq!(principal.reward_id, reward_id);
        assert_eq!(principal.account_debit, "company_cash");
        assert_eq!(principal.account_credit, "stock_inventory");
        assert_eq!(principal.amount_inr, dec("17675"));
        assert_eq!(principal.stock_symbol.as_deref(), Some("TCS"));
        assert_eq!(principal.stock_quantity, Some(dec("5")));

        let fee = &entries[1];
        assert_eq!(fee.account_debit, "company_expense");
        assert_eq!(fee.account_credit, "company_cash");
        assert_eq!(fee.amount_inr, dec("175"));
        assert_eq!(fee.stock_symbol, None);
        assert_eq!(fee.stock_quantity, None);
    }

    #[test]
    fn test_postings_skip_zero_fee() {
        let entries = ledger_postings(
            Uuid::new_v4(),
            "INFY",
            &dec("0.000001"),
            &dec("1"),
            Utc::now(),
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount_inr, dec("0"));
    }

    #[test]
    fn test_postings_are_deterministic_in_amounts() {
        let a = ledger_postings(
            Uuid::new_v4(),
            "TCS",
            &dec("1.5"),
            &dec("3412.3456"),
            Utc::now(),
        );
        let b = ledger_postings(
            Uuid::new_v4(),
            "TCS",
            &dec("1.5"),
            &dec("3412.3456"),
            Utc::now(),
        );

        let amounts = |entries: &Vec<Ledger_Entry>| {
            entries
                .iter()
                .map(|entry| entry.amount_inr.to_string())
                .collect::<Vec<String>>()
        };
        assert_eq!(amounts(&a), amounts(&b));
    }

    #[test]
    fn test_normalize_rejects_non_positive_quantity() {
        assert!(matches!(
            grant("0", None).normalize(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            grant("-1.5", None).normalize(),
            Err(Error::Validation(_))
        ));
        // rounds to zero at six decimal places
        assert!(matches!(
            grant("0.0000004", None).normalize(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_normalize_blank_key_is_none() {
        let normalized = grant("1.5", Some("   ")).normalize().unwrap();

        assert_eq!(normalized.idempotency_key, None);
        assert_eq!(normalized.quantity.to_string(), "1.500000");
    }

    #[test]
    fn test_normalize_requires_user_and_symbol() {
        let mut missing_user = grant("1", None);
        missing_user.user_id = String::from(" ");
        assert!(matches!(missing_user.normalize(), Err(Error::Validation(_))));

        let mut long_symbol = grant("1", None);
        long_symbol.symbol = "X".repeat(MAX_SYMBOL_LEN + 1);
        assert!(matches!(long_symbol.normalize(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_normalize_bounds_quantity_magnitude() {
        for quantity in ["1e20", "1e20000000", "1e-100", "999999999999999999.9999999"] {
            assert!(
                matches!(grant(quantity, None).normalize(), Err(Error::Validation(_))),
                "quantity {}",
                quantity
            );
        }

        let largest = grant("999999999999999999.999999", None).normalize().unwrap();
        assert_eq!(integer_digits(&largest.quantity), MAX_QUANTITY_INTEGER_DIGITS);
    }

    #[tokio::test]
    async fn test_apply_reward_bounds_price_and_total() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let database = DatabasePool::from_pool(pool);
        let ledger = RewardLedger::new(&database);

        let err = ledger
            .apply_reward(grant("1", None), &dec("1e30"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = ledger
            .apply_reward(grant("999999999999999999", None), &dec("1000"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("grant total"));
    }
}
