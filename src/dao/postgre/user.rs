use sqlx::{Error, Transaction};

use super::{DataBase, QueryResult};
use crate::model::{Table, User};

impl Table<User> {
    pub async fn insert_if_not_exists(
        &self,
        data: &User,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<QueryResult, Error> {
        sqlx::query(
            r#"
            INSERT INTO "users" ("id", "name")
            VALUES ($1, $2)
            ON CONFLICT ("id") DO NOTHING
            "#,
        )
        .bind(&data.id)
        .bind(&data.name)
        .execute(&mut **transaction)
        .await
    }
}
