//! Durable batch job queue (C14). `paper_doi`/`pdf_url`/`pdf_path` are
//! collapsed into a single typed `source_kind`/`source_value` pair
//! (§3 "BatchJob").

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::DbResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "in_progress" => JobStatus::InProgress,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "skipped" => JobStatus::Skipped,
            _ => JobStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Doi,
    Url,
    LocalPath,
}

impl SourceKind {
    fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Doi => "doi",
            SourceKind::Url => "url",
            SourceKind::LocalPath => "local_path",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "url" => SourceKind::Url,
            "local_path" => SourceKind::LocalPath,
            _ => SourceKind::Doi,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub batch_id: String,
    pub source_kind: SourceKind,
    pub source_value: String,
    pub paper_title: Option<String>,
    pub status: JobStatus,
    pub attempt_count: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub problems_extracted: i64,
    pub processing_time_ms: f64,
}

impl BatchJob {
    /// Build a fresh pending job for position `index` within `batch_id`.
    pub fn new(
        batch_id: &str,
        index: usize,
        source_kind: SourceKind,
        source_value: String,
        paper_title: Option<String>,
    ) -> Self {
        Self {
            job_id: format!("{batch_id}-{index:04}"),
            batch_id: batch_id.to_string(),
            source_kind,
            source_value,
            paper_title,
            status: JobStatus::Pending,
            attempt_count: 0,
            error_message: None,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
            problems_extracted: 0,
            processing_time_ms: 0.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: String,
    batch_id: String,
    source_kind: String,
    source_value: String,
    paper_title: Option<String>,
    status: String,
    attempt_count: i64,
    error_message: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    problems_extracted: i64,
    processing_time_ms: f64,
}

impl From<JobRow> for BatchJob {
    fn from(row: JobRow) -> Self {
        BatchJob {
            job_id: row.job_id,
            batch_id: row.batch_id,
            source_kind: SourceKind::parse(&row.source_kind),
            source_value: row.source_value,
            paper_title: row.paper_title,
            status: JobStatus::parse(&row.status),
            attempt_count: row.attempt_count,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            problems_extracted: row.problems_extracted,
            processing_time_ms: row.processing_time_ms,
        }
    }
}

/// Progress snapshot for a batch (§3 "BatchProgress").
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub pending_jobs: i64,
    pub in_progress_jobs: i64,
    pub total_problems: i64,
    pub total_processing_time_ms: f64,
}

impl BatchProgress {
    pub fn completion_percentage(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            (self.completed_jobs + self.failed_jobs) as f64 / self.total_jobs as f64 * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending_jobs == 0 && self.in_progress_jobs == 0
    }
}

/// SQLite-backed, resumable job queue for batch extraction runs (C14).
#[derive(Clone)]
pub struct BatchQueueStore {
    pool: SqlitePool,
}

impl BatchQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_batch(&self, batch_id: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO batches (batch_id, created_at) VALUES (?, ?)")
            .bind(batch_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_job(&self, job: &BatchJob) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO jobs (
                job_id, batch_id, source_kind, source_value, paper_title,
                status, attempt_count, error_message, created_at, started_at,
                completed_at, problems_extracted, processing_time_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.job_id)
        .bind(&job.batch_id)
        .bind(job.source_kind.as_str())
        .bind(&job.source_value)
        .bind(&job.paper_title)
        .bind(job.status.as_str())
        .bind(job.attempt_count)
        .bind(&job.error_message)
        .bind(&job.created_at)
        .bind(&job.started_at)
        .bind(&job.completed_at)
        .bind(job.problems_extracted)
        .bind(job.processing_time_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_job(&self, job: &BatchJob) -> DbResult<()> {
        sqlx::query(
            "UPDATE jobs SET
                status = ?,
                attempt_count = ?,
                error_message = ?,
                started_at = ?,
                completed_at = ?,
                problems_extracted = ?,
                processing_time_ms = ?
             WHERE job_id = ?",
        )
        .bind(job.status.as_str())
        .bind(job.attempt_count)
        .bind(&job.error_message)
        .bind(&job.started_at)
        .bind(&job.completed_at)
        .bind(job.problems_extracted)
        .bind(job.processing_time_ms)
        .bind(&job.job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_pending_jobs(&self, batch_id: &str, limit: i64) -> DbResult<Vec<BatchJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT job_id, batch_id, source_kind, source_value, paper_title, status,
                    attempt_count, error_message, created_at, started_at, completed_at,
                    problems_extracted, processing_time_ms
             FROM jobs
             WHERE batch_id = ? AND status = 'pending'
             ORDER BY created_at
             LIMIT ?",
        )
        .bind(batch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BatchJob::from).collect())
    }

    pub async fn get_all_jobs(&self, batch_id: &str) -> DbResult<Vec<BatchJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT job_id, batch_id, source_kind, source_value, paper_title, status,
                    attempt_count, error_message, created_at, started_at, completed_at,
                    problems_extracted, processing_time_ms
             FROM jobs WHERE batch_id = ? ORDER BY created_at",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BatchJob::from).collect())
    }

    pub async fn get_progress(&self, batch_id: &str) -> DbResult<BatchProgress> {
        let row: (i64, i64, i64, i64, i64, i64, f64) = sqlx::query_as(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(problems_extracted), 0),
                COALESCE(SUM(processing_time_ms), 0.0)
             FROM jobs WHERE batch_id = ?",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BatchProgress {
            batch_id: batch_id.to_string(),
            total_jobs: row.0,
            completed_jobs: row.1,
            failed_jobs: row.2,
            pending_jobs: row.3,
            in_progress_jobs: row.4,
            total_problems: row.5,
            total_processing_time_ms: row.6,
        })
    }

    /// Reset orphaned `in_progress` jobs to `pending` so a batch can resume
    /// after a crash (§4.14 "resumable").
    pub async fn reset_in_progress_to_pending(&self, batch_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'pending' WHERE batch_id = ? AND status = 'in_progress'",
        )
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_db::BatchDbPool;

    async fn store() -> BatchQueueStore {
        let db = BatchDbPool::open_in_memory().await.unwrap();
        BatchQueueStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn create_batch_add_jobs_and_track_progress() {
        let queue = store().await;
        queue.create_batch("batch-1").await.unwrap();

        let j0 = BatchJob::new("batch-1", 0, SourceKind::Doi, "10.1/x".into(), None);
        let j1 = BatchJob::new("batch-1", 1, SourceKind::Url, "http://x.pdf".into(), None);
        queue.add_job(&j0).await.unwrap();
        queue.add_job(&j1).await.unwrap();

        let progress = queue.get_progress("batch-1").await.unwrap();
        assert_eq!(progress.total_jobs, 2);
        assert_eq!(progress.pending_jobs, 2);
        assert!(!progress.is_complete());
    }

    #[tokio::test]
    async fn pending_jobs_are_fifo_by_creation_order() {
        let queue = store().await;
        queue.create_batch("batch-1").await.unwrap();
        for i in 0..3 {
            queue
                .add_job(&BatchJob::new("batch-1", i, SourceKind::Doi, format!("doi-{i}"), None))
                .await
                .unwrap();
        }
        let pending = queue.get_pending_jobs("batch-1", 10).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].job_id, "batch-1-0000");
    }

    #[tokio::test]
    async fn completing_a_job_updates_progress() {
        let queue = store().await;
        queue.create_batch("batch-1").await.unwrap();
        let mut job = BatchJob::new("batch-1", 0, SourceKind::Doi, "10.1/x".into(), None);
        queue.add_job(&job).await.unwrap();

        job.status = JobStatus::Completed;
        job.problems_extracted = 5;
        job.processing_time_ms = 120.0;
        queue.update_job(&job).await.unwrap();

        let progress = queue.get_progress("batch-1").await.unwrap();
        assert_eq!(progress.completed_jobs, 1);
        assert_eq!(progress.total_problems, 5);
        assert!(progress.is_complete());
        assert_eq!(progress.completion_percentage(), 100.0);
    }

    #[tokio::test]
    async fn resume_resets_orphaned_in_progress_jobs() {
        let queue = store().await;
        queue.create_batch("batch-1").await.unwrap();
        let mut job = BatchJob::new("batch-1", 0, SourceKind::Doi, "10.1/x".into(), None);
        job.status = JobStatus::InProgress;
        queue.add_job(&job).await.unwrap();

        let reset = queue.reset_in_progress_to_pending("batch-1").await.unwrap();
        assert_eq!(reset, 1);

        let pending = queue.get_pending_jobs("batch-1", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
