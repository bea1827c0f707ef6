use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Error, QueryBuilder, Transaction};

use super::DataBase;
use crate::model::{Price_History, Table};

impl Table<Price_History> {
    pub async fn insert(&self, data: &Price_History) -> Result<(), Error> {
        self.insert_many(&vec![data.clone()]).await
    }

    /// Stores the observations and drops the cached valuations they could
    /// reprice, in one transaction.
    pub async fn insert_many(
        &self,
        data: &Vec<Price_History>,
    ) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }

        let mut transaction = self.pool.begin().await?;

        let mut query_builder: QueryBuilder<DataBase> = QueryBuilder::new(
            r#"
            INSERT INTO "price_history" (
                "symbol",
                "price_inr",
                "timestamp"
            )"#,
        );

        query_builder.push_values(data, |mut b, price| {
            b.push_bind(&price.symbol)
                .push_bind(&price.price_inr)
                .push_bind(price.timestamp);
        });

        let query = query_builder.build();
        query.execute(&mut *transaction).await?;

        Self::invalidate_valuations(data, &mut transaction).await?;

        transaction.commit().await
    }

    /// For every user rewarded in an observed symbol, deletes cached days on
    /// and after the earliest observation of that symbol. Takes the per-user
    /// cache locks first, in user order.
    async fn invalidate_valuations(
        data: &[Price_History],
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<(), Error> {
        let mut earliest: BTreeMap<&str, NaiveDate> = BTreeMap::new();
        for price in data {
            let date = price.timestamp.date_naive();
            earliest
                .entry(price.symbol.as_str())
                .and_modify(|from| *from = (*from).min(date))
                .or_insert(date);
        }

        let symbols = earliest
            .keys()
            .map(|symbol| symbol.to_string())
            .collect::<Vec<String>>();
        let dates = earliest.values().copied().collect::<Vec<NaiveDate>>();

        sqlx::query(
            r#"
            SELECT pg_advisory_xact_lock(hashtext("user_id"))
            FROM (
                SELECT DISTINCT "user_id"
                FROM "rewards"
                WHERE "symbol" = ANY($1)
                ORDER BY "user_id"
            ) AS "holders"
            "#,
        )
        .bind(&symbols)
        .execute(&mut **transaction)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM "daily_valuations" AS "cached"
            USING (
                SELECT DISTINCT "rewards"."user_id", "observed"."from_date"
                FROM UNNEST($1::VARCHAR[], $2::DATE[])
                    AS "observed" ("symbol", "from_date")
                JOIN "rewards" ON "rewards"."symbol" = "observed"."symbol"
            ) AS "stale"
            WHERE
                "cached"."user_id" = "stale"."user_id" AND
                "cached"."date" >= "stale"."from_date"
            "#,
        )
        .bind(&symbols)
        .bind(&dates)
        .execute(&mut **transaction)
        .await?;

        Ok(())
    }

    pub async fn get_latest(
        &self,
        symbol: &str,
    ) -> Result<Option<Price_History>, Error> {
        sqlx::query_as(
            r#"
            SELECT "symbol", "price_inr", "timestamp"
            FROM "price_history"
            WHERE "symbol" = $1
            ORDER BY "timestamp" DESC, "price_inr" DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
    }

    /// Observations of the given symbols up to `until`, grouped by symbol in
    /// ascending time order.
    pub async fn get_by_symbols_until(
        &self,
        symbols: &[String],
        until: DateTime<Utc>,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<Vec<Price_History>, Error> {
        if symbols.is_empty() {
            return Ok(vec![]);
        }

        sqlx::query_as(
            r#"
            SELECT "symbol", "price_inr", "timestamp"
            FROM "price_history"
            WHERE
                "symbol" = ANY($1) AND
                "timestamp" <= $2
            ORDER BY "symbol" ASC, "timestamp" ASC, "price_inr" ASC
            "#,
        )
        .bind(symbols)
        .bind(until)
        .fetch_all(&mut **transaction)
        .await
    }
}
