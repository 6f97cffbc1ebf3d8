//! Background ingestion pipeline.
//!
//! One unit of work per uploaded file: extract text → send to the language
//! model → carve out the JSON object → parse → flatten → persist. Units are
//! dispatched fire-and-forget with `tokio::spawn` after the upload response
//! is acknowledged — no handle, no cancellation, no concurrency bound.
//!
//! A failure at any step is terminal for that file: it is logged, the
//! file's ingestion task is marked failed, and nothing is persisted. The
//! upload API never reports per-file failure directly; it is visible only
//! through the batch summary's task counts and the file's absence from
//! listings.

use anyhow::{anyhow, bail, Result};
use std::sync::Arc;

use crate::extract;
use crate::flatten::flatten_value;
use crate::llm::Analyzer;
use crate::models::TaskState;
use crate::scan::find_json_object;
use crate::store::RecordStore;

/// Everything one background unit needs, captured at upload time.
pub struct IngestJob {
    pub file_name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
    pub request_id: String,
    pub file_id: String,
    pub upload_time: String,
}

/// Spawns the background unit for one file and returns immediately.
pub fn spawn_ingest(store: RecordStore, analyzer: Arc<dyn Analyzer>, job: IngestJob) {
    tokio::spawn(async move {
        let file_id = job.file_id.clone();
        let file_name = job.file_name.clone();

        match process_file(&store, analyzer.as_ref(), job).await {
            Ok(id) => {
                tracing::info!(file = %file_name, record_id = id, "document ingested");
                if let Err(e) = store.mark_task(&file_id, TaskState::Succeeded, None).await {
                    tracing::warn!(file = %file_name, error = %e, "failed to mark task succeeded");
                }
            }
            Err(e) => {
                tracing::error!(file = %file_name, error = %e, "ingestion failed");
                if let Err(mark_err) = store
                    .mark_task(&file_id, TaskState::Failed, Some(&e.to_string()))
                    .await
                {
                    tracing::warn!(file = %file_name, error = %mark_err, "failed to mark task failed");
                }
            }
        }
    });
}

/// Runs the full extract → analyze → carve → parse → flatten → persist flow
/// for one file. Returns the new record's id.
pub async fn process_file(
    store: &RecordStore,
    analyzer: &dyn Analyzer,
    job: IngestJob,
) -> Result<i64> {
    let text = extract::extract_text(&job.extension, &job.bytes)?;
    if text.trim().is_empty() {
        bail!("no text extracted from {}", job.file_name);
    }

    let output = analyzer.analyze(&text).await?;

    let json_str = find_json_object(&output)
        .ok_or_else(|| anyhow!("no JSON object found in model output"))?;
    let data: serde_json::Value = serde_json::from_str(json_str)?;

    let flat = flatten_value(&data);

    let id = store
        .insert(
            &job.file_name,
            &flat,
            &job.request_id,
            &job.file_id,
            &job.upload_time,
        )
        .await?;

    Ok(id)
}
