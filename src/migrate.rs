use anyhow::Result;

use crate::config::Config;
use crate::db;

/// Creates the schema. Idempotent; called by `init` and at `serve` startup.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Documents: one row per extracted file, keyed by an auto-increment id
    // and grouped by the upload batch's request_id. json_data holds the
    // current flat mapping, diff_data only the last transition.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL,
            file_id TEXT NOT NULL DEFAULT '',
            json_data TEXT NOT NULL DEFAULT '{}',
            update_count INTEGER NOT NULL DEFAULT 0,
            diff_data TEXT NOT NULL DEFAULT '{}',
            request_id TEXT NOT NULL DEFAULT '',
            upload_date_time TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Ingestion tasks: one row per uploaded file, written before the
    // background pipeline starts, so failed files stay observable.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_tasks (
            file_id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            state TEXT NOT NULL,
            error TEXT,
            uploaded_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_request_id ON documents(request_id)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingest_tasks_request_id ON ingest_tasks(request_id)",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
