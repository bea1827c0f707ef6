use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, Error, Transaction};

use super::{DataBase, QueryResult};
use crate::model::{Holding, Table};

impl Table<Holding> {
    /// Creates the holding or adds to it. The conflict branch takes the row
    /// lock, so concurrent grants to one holding serialize.
    pub async fn add_quantity(
        &self,
        user_id: &str,
        symbol: &str,
        quantity: &BigDecimal,
        timestamp: DateTime<Utc>,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "holdings" ("user_id", "symbol", "quantity", "last_updated")
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ("user_id", "symbol") DO UPDATE
            SET
                "quantity" = "holdings"."quantity" + EXCLUDED."quantity",
                "last_updated" = EXCLUDED."last_updated"
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .bind(quantity)
        .bind(timestamp)
        .execute(&mut **transaction)
        .await
    }

    /// Affects no row when the balance cannot cover `quantity`.
    pub async fn subtract_quantity(
        &self,
        user_id: &str,
        symbol: &str,
        quantity: &BigDecimal,
        timestamp: DateTime<Utc>,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "holdings"
            SET
                "quantity" = "quantity" - $1,
                "last_updated" = $2
            WHERE
                "user_id" = $3 AND
                "symbol" = $4 AND
                "quantity" >= $1
            "#,
        )
        .bind(quantity)
        .bind(timestamp)
        .bind(user_id)
        .bind(symbol)
        .execute(&mut **transaction)
        .await
    }

    pub async fn get_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Holding>, Error> {
        sqlx::query_as(
            r#"
            SELECT *
            FROM "holdings"
            WHERE "user_id" = $1
            ORDER BY "symbol" ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_one(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> Result<Option<Holding>, Error> {
        sqlx::query_as(
            r#"
            SELECT *
            FROM "holdings"
            WHERE "user_id" = $1 AND "symbol" = $2
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
    }
}
