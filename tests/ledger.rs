use std::{env, str::FromStr};

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use futures::future::join_all;
use tokio::sync::OnceCell;
use uuid::Uuid;

use reward_ledger::{
    configuration::State,
    error::Error,
    handler::{
        historical_valuation::ValuationHistory,
        reward_grant::{RewardGrant, RewardLedger},
        reward_reversal::RewardReversal,
    },
    helpers::to_fixed,
    model::{Price_History, Reward, Reward_Status},
    provider::DatabasePool,
};

static MIGRATED: OnceCell<()> = OnceCell::const_new();

async fn database() -> Option<DatabasePool> {
    let url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL is not set, skipping");
            return None;
        },
    };

    let database = DatabasePool::connect(&url, 16).await.unwrap();

    MIGRATED
        .get_or_init(|| async {
            State::init_migrations(&database).await.unwrap();
        })
        .await;

    Some(database)
}

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn unique(prefix: &str) -> String {
    format!("{}{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn grant(
    user_id: &str,
    symbol: &str,
    quantity: &str,
    timestamp: DateTime<Utc>,
    key: Option<&str>,
) -> RewardGrant {
    RewardGrant {
        user_id: user_id.to_owned(),
        symbol: symbol.to_owned(),
        quantity: dec(quantity),
        timestamp,
        idempotency_key: key.map(|key| key.to_owned()),
        source: String::from("integration"),
    }
}

async fn holding_quantity(
    database: &DatabasePool,
    user_id: &str,
    symbol: &str,
) -> Option<BigDecimal> {
    database
        .holding
        .get_one(user_id, symbol)
        .await
        .unwrap()
        .map(|holding| holding.quantity)
}

#[tokio::test]
async fn test_idempotent_grant_is_applied_once() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let key = unique("K1-");
    let ledger = RewardLedger::new(&database);

    let first = ledger
        .apply_reward(
            grant(&user, &symbol, "1.5", Utc::now(), Some(&key)),
            &dec("2500"),
        )
        .await
        .unwrap();
    let second = ledger
        .apply_reward(
            grant(&user, &symbol, "1.5", Utc::now(), Some(&key)),
            &dec("2500"),
        )
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.reward_id, second.reward_id);
    assert_eq!(
        holding_quantity(&database, &user, &symbol).await,
        Some(dec("1.5"))
    );

    let entries = database
        .ledger_entry
        .get_by_reward(first.reward_id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(to_fixed(&entries[0].amount_inr, 4), "3787.5000");
    assert_eq!(entries[0].account_debit, "company_cash");
    assert_eq!(entries[0].account_credit, "stock_inventory");
    assert_eq!(to_fixed(&entries[1].amount_inr, 4), "37.5000");
    assert_eq!(entries[1].account_debit, "company_expense");
    assert_eq!(entries[1].account_credit, "company_cash");
}

#[tokio::test]
async fn test_concurrent_replays_share_one_reward() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let key = unique("race-");
    let ledger = RewardLedger::new(&database);
    let price = dec("100");

    let receipts = join_all((0..6).map(|_| {
        ledger.apply_reward(
            grant(&user, &symbol, "2", at(9, 10), Some(&key)),
            &price,
        )
    }))
    .await
    .into_iter()
    .collect::<Result<Vec<_>, Error>>()
    .unwrap();

    assert_eq!(receipts.iter().filter(|r| r.created).count(), 1);
    assert!(receipts
        .iter()
        .all(|r| r.reward_id == receipts[0].reward_id));
    assert_eq!(
        holding_quantity(&database, &user, &symbol).await,
        Some(dec("2"))
    );
}

#[tokio::test]
async fn test_concurrent_grants_do_not_lose_updates() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let ledger = RewardLedger::new(&database);
    let price = dec("10");

    let results = join_all((0..10).map(|_| {
        ledger.apply_reward(grant(&user, &symbol, "0.1", at(9, 10), None), &price)
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(
        holding_quantity(&database, &user, &symbol).await,
        Some(dec("1"))
    );
}

#[tokio::test]
async fn test_reversal_restores_holding_and_keeps_ledger() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let ledger = RewardLedger::new(&database);
    let reversal = RewardReversal::new(&database);

    let receipt = ledger
        .apply_reward(grant(&user, &symbol, "10", Utc::now(), None), &dec("250"))
        .await
        .unwrap();

    reversal.reverse(receipt.reward_id).await.unwrap();

    let reward: Reward = database
        .reward
        .get_one(receipt.reward_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reward.status, String::from(Reward_Status::Reversed));
    assert!(reward.reversed_at.is_some());
    assert_eq!(
        holding_quantity(&database, &user, &symbol).await,
        Some(BigDecimal::zero())
    );
    assert_eq!(
        database
            .ledger_entry
            .get_by_reward(receipt.reward_id)
            .await
            .unwrap()
            .len(),
        2
    );

    let err = reversal.reverse(receipt.reward_id).await.unwrap_err();
    assert!(matches!(err, Error::RewardAlreadyReversed(_)));
    assert_eq!(
        holding_quantity(&database, &user, &symbol).await,
        Some(BigDecimal::zero())
    );
}

#[tokio::test]
async fn test_reversal_of_unknown_reward() {
    let Some(database) = database().await else {
        return;
    };

    let err = RewardReversal::new(&database)
        .reverse(Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RewardNotFound(_)));
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_failed_grant_leaves_no_trace() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let key = unique("bad-");

    let err = RewardLedger::new(&database)
        .apply_reward(
            grant(&user, &symbol, "1", Utc::now(), Some(&key)),
            &BigDecimal::zero(),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(database
        .reward
        .get_by_idempotency_key(&key)
        .await
        .unwrap()
        .is_none());

    assert_eq!(holding_quantity(&database, &user, &symbol).await, None);
}

#[tokio::test]
async fn test_store_error_after_reward_insert_rolls_back_grant() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let key = unique("overflow-");
    let full = dec("999999999999999999");

    // leaves no room in NUMERIC(24, 6) for the next grant's holding update
    let mut tx = database.pool.begin().await.unwrap();
    database
        .holding
        .add_quantity(&user, &symbol, &full, Utc::now(), &mut tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let err = RewardLedger::new(&database)
        .apply_reward(
            grant(&user, &symbol, "1", Utc::now(), Some(&key)),
            &dec("1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SQL(_)));

    assert!(database
        .reward
        .get_by_idempotency_key(&key)
        .await
        .unwrap()
        .is_none());
    assert!(database
        .reward
        .get_by_user_between(&user, at(1, 0), Utc::now())
        .await
        .unwrap()
        .is_empty());

    let entries: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "ledger_entries" WHERE "stock_symbol" = $1"#,
    )
    .bind(&symbol)
    .fetch_one(&database.pool)
    .await
    .unwrap();
    assert_eq!(entries, 0);
    assert_eq!(holding_quantity(&database, &user, &symbol).await, Some(full));
}

#[tokio::test]
async fn test_concurrent_reversals_apply_once() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let ledger = RewardLedger::new(&database);
    let reversal = RewardReversal::new(&database);

    let kept = ledger
        .apply_reward(grant(&user, &symbol, "10", at(9, 10), None), &dec("100"))
        .await
        .unwrap();
    let reversed = ledger
        .apply_reward(grant(&user, &symbol, "10", at(9, 11), None), &dec("100"))
        .await
        .unwrap();

    let results =
        join_all((0..6).map(|_| reversal.reverse(reversed.reward_id))).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, Error::RewardAlreadyReversed(_))));
    assert_eq!(
        holding_quantity(&database, &user, &symbol).await,
        Some(dec("10"))
    );

    let reward = database
        .reward
        .get_one(kept.reward_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reward.status, String::from(Reward_Status::Completed));
}

#[tokio::test]
async fn test_concurrent_grant_and_reversal_on_one_holding() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("S");
    let ledger = RewardLedger::new(&database);
    let reversal = RewardReversal::new(&database);

    let first = ledger
        .apply_reward(grant(&user, &symbol, "4", at(9, 10), None), &dec("100"))
        .await
        .unwrap();

    let price = dec("100");
    let (reversed, granted) = tokio::join!(
        reversal.reverse(first.reward_id),
        ledger.apply_reward(
            grant(&user, &symbol, "3", at(9, 12), None),
            &price
        ),
    );

    reversed.unwrap();
    granted.unwrap();
    assert_eq!(
        holding_quantity(&database, &user, &symbol).await,
        Some(dec("3"))
    );
}

#[tokio::test]
async fn test_historical_valuation_and_cache() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let reliance = unique("R");
    let tcs = unique("T");
    let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let ledger = RewardLedger::new(&database);
    let history = ValuationHistory::new(&database);

    database
        .price_history
        .insert_many(&vec![
            Price_History {
                symbol: reliance.to_owned(),
                price_inr: dec("2500"),
                timestamp: at(8, 9),
            },
            Price_History {
                symbol: reliance.to_owned(),
                price_inr: dec("2600"),
                timestamp: at(9, 9),
            },
            Price_History {
                symbol: tcs.to_owned(),
                price_inr: dec("3500"),
                timestamp: at(9, 10),
            },
        ])
        .await
        .unwrap();

    ledger
        .apply_reward(grant(&user, &reliance, "10", at(8, 10), None), &dec("2500"))
        .await
        .unwrap();
    ledger
        .apply_reward(grant(&user, &tcs, "5", at(9, 11), None), &dec("3500"))
        .await
        .unwrap();

    let first = history.daily_valuations_at(&user, today).await.unwrap();
    let totals = first
        .iter()
        .map(|v| (v.date, to_fixed(&v.total_inr, 4)))
        .collect::<Vec<_>>();
    assert_eq!(
        totals,
        vec![
            (NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(), String::from("25000.0000")),
            (NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(), String::from("43500.0000")),
        ]
    );

    let cached = history.daily_valuations_at(&user, today).await.unwrap();
    let recomputed = history.reconstruct(&user, today).await.unwrap();
    assert_eq!(first, cached);
    assert_eq!(first, recomputed);

    ledger
        .apply_reward(grant(&user, &reliance, "1", at(9, 12), None), &dec("2600"))
        .await
        .unwrap();

    let updated = history.daily_valuations_at(&user, today).await.unwrap();
    assert_eq!(to_fixed(&updated[0].total_inr, 4), "25000.0000");
    assert_eq!(to_fixed(&updated[1].total_inr, 4), "46100.0000");
}

#[tokio::test]
async fn test_back_dated_price_reprices_cached_days() {
    let Some(database) = database().await else {
        return;
    };
    let user = unique("user-");
    let symbol = unique("B");
    let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let history = ValuationHistory::new(&database);

    database
        .price_history
        .insert(&Price_History {
            symbol: symbol.to_owned(),
            price_inr: dec("2500"),
            timestamp: at(8, 9),
        })
        .await
        .unwrap();
    RewardLedger::new(&database)
        .apply_reward(grant(&user, &symbol, "10", at(8, 10), None), &dec("2500"))
        .await
        .unwrap();

    let cached = history.daily_valuations_at(&user, today).await.unwrap();
    assert_eq!(to_fixed(&cached[1].total_inr, 4), "25000.0000");

    database
        .price_history
        .insert_many(&vec![Price_History {
            symbol: symbol.to_owned(),
            price_inr: dec("2700"),
            timestamp: at(9, 12),
        }])
        .await
        .unwrap();

    let repriced = history.daily_valuations_at(&user, today).await.unwrap();
    assert_eq!(to_fixed(&repriced[0].total_inr, 4), "25000.0000");
    assert_eq!(to_fixed(&repriced[1].total_inr, 4), "27000.0000");
    assert_eq!(repriced, history.reconstruct(&user, today).await.unwrap());
}

#[tokio::test]
async fn test_historical_valuation_without_rewards() {
    let Some(database) = database().await else {
        return;
    };
    let today = Utc::now().date_naive();

    let valuations = ValuationHistory::new(&database)
        .daily_valuations_at(&unique("nobody-"), today)
        .await
        .unwrap();

    assert!(valuations.is_empty());
}
