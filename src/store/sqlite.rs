//! SQLite-backed [`MessageStore`].
//!
//! Bodies are stored as their serialized JSON in the `messages` table and
//! parsed back on lookup. Lookups are chunked so a shard of any size stays
//! under SQLite's bound-parameter limit.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::models::Message;

use super::MessageStore;

/// Ids bound per `IN (...)` query.
const LOOKUP_CHUNK: usize = 500;

pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert_messages(&self, messages: &[Message]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for message in messages {
            let payload = serde_json::to_string(message)?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO messages (id, author_id, reply_target_id, payload) VALUES (?, ?, ?, ?)",
            )
            .bind(message.id())
            .bind(message.author().id)
            .bind(message.reply_target().map(|t| t.id.as_str()))
            .bind(payload)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn get_bodies(&self, ids: &[String]) -> Result<HashMap<String, Message>> {
        let mut found = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT id, payload FROM messages WHERE id IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }

            for row in query.fetch_all(&self.pool).await? {
                let id: String = row.get("id");
                let payload: String = row.get("payload");
                match Message::parse_line(&payload) {
                    Ok(message) => {
                        found.insert(id, message);
                    }
                    Err(e) => warn!(id = %id, error = %e, "stored payload no longer parses; treating as missing"),
                }
            }
        }

        Ok(found)
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM messages").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use crate::models::fixtures::original;
    use tempfile::TempDir;

    async fn scratch_store() -> (TempDir, SqliteMessageStore) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("scratch.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, SqliteMessageStore::new(pool))
    }

    #[tokio::test]
    async fn stores_and_bulk_loads_bodies() {
        let (_tmp, store) = scratch_store().await;
        let written = store
            .insert_messages(&[
                original("1", "a", "10", None),
                original("2", "b", "11", Some(("1", "a", "10"))),
            ])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let bodies = store
            .get_bodies(&["1".to_string(), "2".to_string(), "3".to_string()])
            .await
            .unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies["2"].reply_target().unwrap().id, "1");
        assert!(!bodies.contains_key("3"));
    }

    #[tokio::test]
    async fn duplicate_insert_keeps_first() {
        let (_tmp, store) = scratch_store().await;
        store.insert_messages(&[original("1", "first", "10", None)]).await.unwrap();
        let written = store
            .insert_messages(&[original("1", "second", "20", None)])
            .await
            .unwrap();
        assert_eq!(written, 0);
        let bodies = store.get_bodies(&["1".to_string()]).await.unwrap();
        assert_eq!(bodies["1"].author().handle, "first");
    }

    #[tokio::test]
    async fn lookup_spans_multiple_chunks() {
        let (_tmp, store) = scratch_store().await;
        let messages: Vec<Message> = (1..=1200)
            .map(|n| original(&n.to_string(), "u", "1", None))
            .collect();
        store.insert_messages(&messages).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1200);

        let ids: Vec<String> = (1..=1300).map(|n: u32| n.to_string()).collect();
        let bodies = store.get_bodies(&ids).await.unwrap();
        assert_eq!(bodies.len(), 1200);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
