use chrono::{DateTime, Utc};
use sqlx::{Error, Transaction};
use uuid::Uuid;

use super::{DataBase, QueryResult};
use crate::model::{Locked_Reward, Reward, Reward_Status, Table};

impl Table<Reward> {
    pub async fn insert(
        &self,
        data: &Reward,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "rewards" (
                "id",
                "user_id",
                "symbol",
                "quantity",
                "timestamp",
                "idempotency_key",
                "source",
                "created_at",
                "status",
                "reversed_at"
            )
            VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(data.id)
        .bind(&data.user_id)
        .bind(&data.symbol)
        .bind(&data.quantity)
        .bind(data.timestamp)
        .bind(&data.idempotency_key)
        .bind(&data.source)
        .bind(data.created_at)
        .bind(&data.status)
        .bind(data.reversed_at)
        .execute(&mut **transaction)
        .await
    }

    pub async fn get_one(&self, id: Uuid) -> Result<Option<Reward>, Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM "rewards" WHERE "id" = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Reward>, Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM "rewards" WHERE "idempotency_key" = $1 LIMIT 1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
    }

    /// Takes the row lock that serializes reversals of one reward.
    pub async fn lock_for_update(
        &self,
        id: Uuid,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<Option<Locked_Reward>, Error> {
        sqlx::query_as(
            r#"
            SELECT "status", "user_id", "symbol", "quantity"
            FROM "rewards"
            WHERE "id" = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **transaction)
        .await
    }

    pub async fn mark_reversed(
        &self,
        id: Uuid,
        reversed_at: DateTime<Utc>,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            UPDATE "rewards"
            SET "status" = $1, "reversed_at" = $2
            WHERE "id" = $3
            "#,
        )
        .bind(String::from(Reward_Status::Reversed))
        .bind(reversed_at)
        .bind(id)
        .execute(&mut **transaction)
        .await
    }

    pub async fn get_first_timestamp(
        &self,
        user_id: &str,
    ) -> Result<Option<DateTime<Utc>>, Error> {
        let (value,): (Option<DateTime<Utc>>,) = sqlx::query_as(
            r#"
            SELECT MIN("timestamp") FROM "rewards" WHERE "user_id" = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(value)
    }

    /// Every reward of the user granted at or before `until`, any status.
    pub async fn get_by_user_until(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<Vec<Reward>, Error> {
        sqlx::query_as(
            r#"
            SELECT *
            FROM "rewards"
            WHERE "user_id" = $1 AND "timestamp" <= $2
            ORDER BY "timestamp" ASC, "id" ASC
            "#,
        )
        .bind(user_id)
        .bind(until)
        .fetch_all(&mut **transaction)
        .await
    }

    pub async fn get_by_user_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reward>, Error> {
        sqlx::query_as(
            r#"
            SELECT *
            FROM "rewards"
            WHERE
                "user_id" = $1 AND
                "timestamp" >= $2 AND
                "timestamp" < $3
            ORDER BY "timestamp" ASC
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
    }
}
