use sqlx::{Error, Transaction};

use super::{DataBase, QueryResult};
use crate::model::{Stock, Table};

impl Table<Stock> {
    pub async fn insert_if_not_exists(
        &self,
        data: &Stock,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "stocks" ("symbol", "name")
            VALUES ($1, $2)
            ON CONFLICT ("symbol") DO NOTHING
            "#,
        )
        .bind(&data.symbol)
        .bind(&data.name)
        .execute(&mut **transaction)
        .await
    }

    pub async fn get_symbols(&self) -> Result<Vec<String>, Error> {
        let data: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT "symbol" FROM "stocks" ORDER BY "symbol" ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(data.into_iter().map(|(symbol,)| symbol).collect())
    }
}
