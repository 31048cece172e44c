use anyhow::Result;
use sqlx::SqlitePool;

/// Create the scratch schema. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Raw message bodies keyed by id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            reply_target_id TEXT,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_reply_target ON messages(reply_target_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
