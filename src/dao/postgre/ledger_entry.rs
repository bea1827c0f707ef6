use sqlx::{Error, QueryBuilder, Transaction};
use uuid::Uuid;

use super::DataBase;
use crate::model::{Ledger_Entry, Table};

impl Table<Ledger_Entry> {
    pub async fn insert_many(
        &self,
        data: &Vec<Ledger_Entry>,
        transaction: &mut Transaction<'_, DataBase>,
    ) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<DataBase> = QueryBuilder::new(
            r#"
            INSERT INTO "ledger_entries" (
                "id",
                "reward_id",
                "entry_time",
                "account_debit",
                "account_credit",
                "amount_inr",
                "stock_symbol",
                "stock_quantity",
                "description"
            )"#,
        );

        query_builder.push_values(data, |mut b, entry| {
            b.push_bind(entry.id)
                .push_bind(entry.reward_id)
                .push_bind(entry.entry_time)
                .push_bind(&entry.account_debit)
                .push_bind(&entry.account_credit)
                .push_bind(&entry.amount_inr)
                .push_bind(&entry.stock_symbol)
                .push_bind(&entry.stock_quantity)
                .push_bind(&entry.description);
        });

        let query = query_builder.build();
        query.execute(&mut **transaction).await?;
        Ok(())
    }

    pub async fn get_by_reward(
        &self,
        reward_id: Uuid,
    ) -> Result<Vec<Ledger_Entry>, Error> {
        sqlx::query_as(
            r#"
            SELECT *
            FROM "ledger_entries"
            WHERE "reward_id" = $1
            ORDER BY "entry_time" ASC, "amount_inr" DESC
            "#,
        )
        .bind(reward_id)
        .fetch_all(&self.pool)
        .await
    }
}
