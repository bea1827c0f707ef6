use chrono::NaiveDate;
use sqlx::{Error, QueryBuilder, Transaction};

use super::{DataBase, QueryResult};
use crate::model::{Daily_Valuation, Table};

impl Table<Daily_Valuation> {
    pub async fn get_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Daily_Valuation>, Error> {
        sqlx::query_as(
            r#"
            SELECT "user_id", "date", "total_inr"
            FROM "daily_valuations"
            WHERE
                "user_id" = $1 AND
                "date" >= $2 AND
                "date" <= $3
            ORDER BY "date" ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn upsert_many(
        &self,
        data: &Vec<Daily_Valuation>,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<DataBase> = QueryBuilder::new(
            r#"
            INSERT INTO "daily_valuations" (
                "user_id",
                "date",
                "total_inr"
            )"#,
        );

        query_builder.push_values(data, |mut b, valuation| {
            b.push_bind(&valuation.user_id)
                .push_bind(valuation.date)
                .push_bind(&valuation.total_inr);
        });

        query_builder.push(
            r#"
            ON CONFLICT ("user_id", "date") DO UPDATE
            SET "total_inr" = EXCLUDED."total_inr"
            "#,
        );

        let query = query_builder.build();
        query.execute(&mut **transaction).await?;
        Ok(())
    }

    /// Drops cached days on and after `from`.
    pub async fn delete_from(
        &self,
        user_id: &str,
        from: NaiveDate,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            DELETE FROM "daily_valuations"
            WHERE "user_id" = $1 AND "date" >= $2
            "#,
        )
        .bind(user_id)
        .bind(from)
        .execute(&mut **transaction)
        .await
    }

    /// Serializes cache invalidation against cache materialization for one
    /// user until the transaction ends.
    pub async fn lock_user(
        &self,
        user_id: &str,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<(), Error> {
        sqlx::query(
            r#"
            SELECT pg_advisory_xact_lock(hashtext($1))
            "#,
        )
        .bind(user_id)
        .execute(&mut **transaction)
        .await
        .map(drop)
    }
}
