//! SQLite-backed record store.
//!
//! All row access goes through [`RecordStore`]; the API layer never touches
//! the database directly. The store wraps the shared [`SqlitePool`] — each
//! operation acquires a pooled connection for its own duration and releases
//! it on every exit path, success or failure.

use anyhow::Result;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::diff::{compute_diff, FlatDiff};
use crate::flatten::FlatMap;
use crate::models::{now_store_time, BatchSummary, DocumentRecord, IngestTask, TaskState};

/// CRUD operations over the documents and ingest_tasks tables.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts a freshly ingested document with `update_count = 0` and an
    /// empty diff. Returns the store-assigned row id.
    pub async fn insert(
        &self,
        file_name: &str,
        flat_data: &FlatMap,
        request_id: &str,
        file_id: &str,
        upload_time: &str,
    ) -> Result<i64> {
        let json_data = serde_json::to_string(flat_data)?;
        let result = sqlx::query(
            r#"
            INSERT INTO documents (file_name, file_id, json_data, update_count, diff_data, request_id, upload_date_time)
            VALUES (?, ?, ?, 0, '{}', ?, ?)
            "#,
        )
        .bind(file_name)
        .bind(file_id)
        .bind(&json_data)
        .bind(request_id)
        .bind(upload_time)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Returns every persisted record, ordered by row id.
    pub async fn fetch_all(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            "SELECT id, file_name, file_id, json_data, update_count, diff_data, request_id, upload_date_time FROM documents ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Returns all records for one upload batch. An empty result means the
    /// batch is unknown; the caller decides whether that is a 404.
    pub async fn fetch_by_batch(&self, request_id: &str) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_name, file_id, json_data, update_count, diff_data, request_id, upload_date_time
            FROM documents
            WHERE request_id = ?
            ORDER BY id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Looks up one record by its integer primary key.
    pub async fn fetch_by_id(&self, id: i64) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT id, file_name, file_id, json_data, update_count, diff_data, request_id, upload_date_time FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Upsert-on-update: if `id` exists, diffs the stored data against
    /// `new_data`, bumps `update_count`, overwrites `json_data` and
    /// `diff_data`, and returns the diff. If absent, inserts a new auto-id
    /// row named `file_{id}` with `update_count = 0` and an empty diff, and
    /// returns `None`.
    ///
    /// The existing-row path is read-modify-write with no row lock;
    /// concurrent updates to the same id can interleave.
    pub async fn update_or_insert(&self, id: i64, new_data: &Value) -> Result<Option<FlatDiff>> {
        let row = sqlx::query("SELECT json_data, update_count FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let old_json: String = row.get("json_data");
                let update_count: i64 = row.get("update_count");
                let old: Value =
                    serde_json::from_str(&old_json).unwrap_or_else(|_| Value::Object(Default::default()));

                let diff = compute_diff(&old, new_data);

                sqlx::query(
                    "UPDATE documents SET json_data = ?, update_count = ?, diff_data = ? WHERE id = ?",
                )
                .bind(serde_json::to_string(new_data)?)
                .bind(update_count + 1)
                .bind(serde_json::to_string(&diff)?)
                .bind(id)
                .execute(&self.pool)
                .await?;

                Ok(Some(diff))
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (file_name, json_data, update_count, diff_data)
                    VALUES (?, ?, 0, '{}')
                    "#,
                )
                .bind(format!("file_{}", id))
                .bind(serde_json::to_string(new_data)?)
                .execute(&self.pool)
                .await?;

                Ok(None)
            }
        }
    }

    /// Deletes every record whose id appears in `ids`. Absent ids are
    /// silently ignored. Returns the number of rows removed.
    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM documents WHERE id IN ({})", placeholders);

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Per-batch aggregates, grouped over ingestion tasks so a batch keeps
    /// its full file count even when some files never persisted. Update
    /// counts are summed from the batch's surviving documents.
    pub async fn summarize_by_batch(&self) -> Result<Vec<BatchSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT t.request_id,
                   COUNT(*) AS file_count,
                   MIN(t.uploaded_at) AS upload_date_time,
                   SUM(CASE WHEN t.state = 'pending' THEN 1 ELSE 0 END) AS pending_count,
                   SUM(CASE WHEN t.state = 'succeeded' THEN 1 ELSE 0 END) AS succeeded_count,
                   SUM(CASE WHEN t.state = 'failed' THEN 1 ELSE 0 END) AS failed_count,
                   (SELECT COALESCE(SUM(d.update_count), 0)
                    FROM documents d
                    WHERE d.request_id = t.request_id) AS total_update_count
            FROM ingest_tasks t
            GROUP BY t.request_id
            ORDER BY upload_date_time
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| BatchSummary {
                request_id: row.get("request_id"),
                file_count: row.get("file_count"),
                upload_date_time: row.get("upload_date_time"),
                total_update_count: row.get("total_update_count"),
                pending_count: row.get("pending_count"),
                succeeded_count: row.get("succeeded_count"),
                failed_count: row.get("failed_count"),
            })
            .collect())
    }

    // ============ Ingestion tasks ============

    /// Records a pending ingestion task before the background unit starts.
    pub async fn create_task(
        &self,
        file_id: &str,
        request_id: &str,
        file_name: &str,
        upload_time: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_tasks (file_id, request_id, file_name, state, error, uploaded_at, updated_at)
            VALUES (?, ?, ?, 'pending', NULL, ?, ?)
            "#,
        )
        .bind(file_id)
        .bind(request_id)
        .bind(file_name)
        .bind(upload_time)
        .bind(now_store_time())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Moves a task to its terminal state, keeping the failure text if any.
    pub async fn mark_task(
        &self,
        file_id: &str,
        state: TaskState,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE ingest_tasks SET state = ?, error = ?, updated_at = ? WHERE file_id = ?")
            .bind(state.as_str())
            .bind(error)
            .bind(now_store_time())
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Returns the ingestion tasks recorded for one upload batch.
    pub async fn fetch_tasks_by_batch(&self, request_id: &str) -> Result<Vec<IngestTask>> {
        let rows = sqlx::query(
            r#"
            SELECT file_id, request_id, file_name, state, error, uploaded_at, updated_at
            FROM ingest_tasks
            WHERE request_id = ?
            ORDER BY file_id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| IngestTask {
                file_id: row.get("file_id"),
                request_id: row.get("request_id"),
                file_name: row.get("file_name"),
                state: row.get("state"),
                error: row.get("error"),
                uploaded_at: row.get("uploaded_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
    let json_data: String = row.get("json_data");
    let diff_data: String = row.get("diff_data");

    DocumentRecord {
        id: row.get("id"),
        file_name: row.get("file_name"),
        file_id: row.get("file_id"),
        json_data: serde_json::from_str(&json_data)
            .unwrap_or_else(|_| Value::Object(Default::default())),
        update_count: row.get("update_count"),
        diff_data: serde_json::from_str(&diff_data)
            .unwrap_or_else(|_| Value::Object(Default::default())),
        request_id: row.get("request_id"),
        upload_date_time: row.get("upload_date_time"),
    }
}
