//! Concurrent, resumable batch processing over the durable job queue
//! (C15, §4.15). Wraps [`kg_db::BatchQueueStore`]; the queue itself stays
//! entirely in `kg-db`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kg_core::config::BatchSettings;
use kg_db::{BatchJob, BatchProgress, BatchQueueStore, JobStatus, SourceKind};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::ExtractionResult;
use crate::pipeline::PaperProcessingResult;

/// One paper to enqueue, before a job id has been assigned.
#[derive(Debug, Clone)]
pub struct PaperSpec {
    pub source_kind: SourceKind,
    pub source_value: String,
    pub paper_title: Option<String>,
}

/// Outcome of one `process_batch`/`resume_batch` run.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_id: String,
    pub progress: BatchProgress,
}

/// Callback invoked after each scheduling round with the current
/// aggregate progress (§4.15 step 4).
pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// Runs one job: fetch source bytes/text per its `source_kind`, process
/// through the extraction pipeline, and (if configured) persist to the
/// knowledge graph. Injected so `kg-extraction` never depends on
/// `kg-acquisition`/`kg-graph` directly.
pub type JobRunner = Arc<
    dyn Fn(
            BatchJob,
        ) -> Pin<Box<dyn Future<Output = ExtractionResult<PaperProcessingResult>> + Send>>
        + Send
        + Sync,
>;

/// Drives the durable job queue under a bounded concurrency cap (C15).
pub struct BatchProcessor {
    store: Arc<BatchQueueStore>,
    settings: BatchSettings,
    runner: JobRunner,
    on_progress: Option<ProgressCallback>,
}

impl BatchProcessor {
    pub fn new(store: Arc<BatchQueueStore>, settings: BatchSettings, runner: JobRunner) -> Self {
        Self { store, settings, runner, on_progress: None }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Create a fresh batch, persist one job per paper, then run the
    /// scheduling loop to completion (§4.15 steps 1-5).
    pub async fn process_batch(
        &self,
        batch_id: &str,
        papers: Vec<PaperSpec>,
    ) -> ExtractionResult<BatchResult> {
        self.store.create_batch(batch_id).await?;

        for (index, paper) in papers.into_iter().enumerate() {
            let job = BatchJob::new(
                batch_id,
                index,
                paper.source_kind,
                paper.source_value,
                paper.paper_title,
            );
            self.store.add_job(&job).await?;
        }

        self.run_loop(batch_id).await
    }

    /// Flip orphaned `in_progress` jobs back to `pending`, then resume the
    /// scheduling loop (§4.15).
    pub async fn resume_batch(&self, batch_id: &str) -> ExtractionResult<BatchResult> {
        let reset = self.store.reset_in_progress_to_pending(batch_id).await?;
        if reset > 0 {
            info!(batch_id, reset, "reset orphaned in_progress jobs to pending");
        }
        self.run_loop(batch_id).await
    }

    async fn run_loop(&self, batch_id: &str) -> ExtractionResult<BatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent));

        loop {
            let pending = self
                .store
                .get_pending_jobs(batch_id, self.settings.max_concurrent as i64)
                .await?;

            if pending.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(pending.len());
            for job in pending {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                let store = self.store.clone();
                let runner = self.runner.clone();
                let max_retries = self.settings.max_retries;
                let retry_delay = Duration::from_millis(self.settings.retry_delay_ms);

                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    run_one_job(store, runner, job, max_retries, retry_delay).await
                }));
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "batch job task panicked");
                }
            }

            let progress = self.store.get_progress(batch_id).await?;
            if let Some(callback) = &self.on_progress {
                callback(&progress);
            }
        }

        let progress = self.store.get_progress(batch_id).await?;
        Ok(BatchResult { batch_id: batch_id.to_string(), progress })
    }
}

async fn run_one_job(
    store: Arc<BatchQueueStore>,
    runner: JobRunner,
    mut job: BatchJob,
    max_retries: u32,
    retry_delay: Duration,
) {
    job.status = JobStatus::InProgress;
    job.attempt_count += 1;
    job.started_at = Some(chrono::Utc::now().to_rfc3339());
    if let Err(e) = store.update_job(&job).await {
        error!(job_id = %job.job_id, error = %e, "failed to mark job in_progress");
        return;
    }

    let started = Instant::now();
    match runner(job.clone()).await {
        Ok(result) => {
            job.status = JobStatus::Completed;
            job.completed_at = Some(chrono::Utc::now().to_rfc3339());
            job.problems_extracted = result.problem_count() as i64;
            job.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
            job.error_message = None;
        }
        Err(e) => {
            warn!(job_id = %job.job_id, error = %e, attempt = job.attempt_count, "batch job failed");
            job.error_message = Some(e.to_string());
            job.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;

            if (job.attempt_count as u32) < max_retries {
                tokio::time::sleep(retry_delay).await;
                job.status = JobStatus::Pending;
                job.started_at = None;
            } else {
                job.status = JobStatus::Failed;
                job.completed_at = Some(chrono::Utc::now().to_rfc3339());
            }
        }
    }

    if let Err(e) = store.update_job(&job).await {
        error!(job_id = %job.job_id, error = %e, "failed to persist job result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_db::test_helpers::create_test_batch_store;

    fn runner_always_succeeds() -> JobRunner {
        Arc::new(|_job: BatchJob| {
            Box::pin(async move { Ok(PaperProcessingResult::default()) })
        })
    }

    fn runner_always_fails() -> JobRunner {
        Arc::new(|_job: BatchJob| {
            Box::pin(async move {
                Err(crate::error::ExtractionError::Llm("simulated failure".to_string()))
            })
        })
    }

    #[tokio::test]
    async fn process_batch_completes_all_jobs() {
        let store = Arc::new(create_test_batch_store().await.unwrap());
        let processor =
            BatchProcessor::new(store, BatchSettings { max_concurrent: 2, ..Default::default() }, runner_always_succeeds());

        let papers = vec![
            PaperSpec { source_kind: SourceKind::Doi, source_value: "10.1/a".to_string(), paper_title: None },
            PaperSpec { source_kind: SourceKind::Doi, source_value: "10.1/b".to_string(), paper_title: None },
        ];

        let result = processor.process_batch("batch-1", papers).await.unwrap();
        assert_eq!(result.progress.total_jobs, 2);
        assert!(result.progress.is_complete());
    }

    #[tokio::test]
    async fn failed_jobs_retry_then_terminate_as_failed() {
        let store = Arc::new(create_test_batch_store().await.unwrap());
        // attempt_count < max_retries (§4.15 step 3) retries exactly once: the
        // first attempt (attempt_count=1) is below max_retries=2 and is reset
        // to pending, the second (attempt_count=2) is not and terminates failed.
        let settings = BatchSettings { max_concurrent: 1, max_retries: 2, retry_delay_ms: 1, ..Default::default() };
        let processor = BatchProcessor::new(store.clone(), settings, runner_always_fails());

        let papers =
            vec![PaperSpec { source_kind: SourceKind::Doi, source_value: "10.1/c".to_string(), paper_title: None }];
        let result = processor.process_batch("batch-2", papers).await.unwrap();

        let jobs = store.get_all_jobs("batch-2").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].attempt_count, 2);
        assert_eq!(result.progress.failed_jobs, 1);
    }
}
