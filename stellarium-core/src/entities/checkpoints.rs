use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CheckpointRecord {
    pub stream: String,
    pub cursor: String,
    /// Unix seconds.
    pub saved_at: i64,
}

#[derive(Debug, Clone)]
/// Load every persisted checkpoint.
pub struct ListCheckpoints;

impl Processor<ListCheckpoints> for DatabaseProcessor {
    type Output = Vec<CheckpointRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListCheckpoints")]
    async fn process(&self, _: ListCheckpoints) -> Result<Vec<CheckpointRecord>, sqlx::Error> {
        sqlx::query_as::<_, CheckpointRecord>("SELECT stream, cursor, saved_at FROM checkpoints")
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Upsert a set of `(stream, cursor)` pairs in one transaction, all stamped
/// with `saved_at`.
pub struct SaveCheckpoints {
    pub cursors: Vec<(String, String)>,
    pub saved_at: i64,
}

impl Processor<SaveCheckpoints> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SaveCheckpoints")]
    async fn process(&self, save: SaveCheckpoints) -> Result<(), sqlx::Error> {
        if save.cursors.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (stream, cursor) in save.cursors {
            sqlx::query(
                "INSERT INTO checkpoints (stream, cursor, saved_at) VALUES (?, ?, ?) \
                 ON CONFLICT (stream) DO UPDATE SET cursor = excluded.cursor, saved_at = excluded.saved_at",
            )
            .bind(stream)
            .bind(cursor)
            .bind(save.saved_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_overwrites_previous_cursor() {
        let db = DatabaseProcessor::in_memory().await.unwrap();
        db.process(SaveCheckpoints {
            cursors: vec![
                ("operations".into(), "100".into()),
                ("trades".into(), "200-1".into()),
            ],
            saved_at: 1_000,
        })
        .await
        .unwrap();
        db.process(SaveCheckpoints {
            cursors: vec![("operations".into(), "150".into())],
            saved_at: 2_000,
        })
        .await
        .unwrap();

        let mut rows = db.process(ListCheckpoints).await.unwrap();
        rows.sort_by(|a, b| a.stream.cmp(&b.stream));
        assert_eq!(
            rows,
            vec![
                CheckpointRecord {
                    stream: "operations".into(),
                    cursor: "150".into(),
                    saved_at: 2_000,
                },
                CheckpointRecord {
                    stream: "trades".into(),
                    cursor: "200-1".into(),
                    saved_at: 1_000,
                },
            ]
        );
    }
}
