use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SubscriberRecord {
    pub id: i64,
    pub stellar_account: Option<String>,
}

#[derive(Debug, Clone)]
/// Load every subscriber row.
pub struct ListSubscribers;

impl Processor<ListSubscribers> for DatabaseProcessor {
    type Output = Vec<SubscriberRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListSubscribers")]
    async fn process(&self, _: ListSubscribers) -> Result<Vec<SubscriberRecord>, sqlx::Error> {
        sqlx::query_as::<_, SubscriberRecord>("SELECT id, stellar_account FROM subscribers")
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Insert a subscriber. Fails on a duplicate id.
pub struct InsertSubscriber {
    pub id: i64,
    pub stellar_account: String,
}

impl Processor<InsertSubscriber> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertSubscriber")]
    async fn process(&self, insert: InsertSubscriber) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO subscribers (id, stellar_account) VALUES (?, ?)")
            .bind(insert.id)
            .bind(insert.stellar_account)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Delete a subscriber. Returns the number of rows removed.
pub struct DeleteSubscriber {
    pub id: i64,
}

impl Processor<DeleteSubscriber> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteSubscriber")]
    async fn process(&self, delete: DeleteSubscriber) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = ?")
            .bind(delete.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
