use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use uuid::Uuid;

use crate::models::job::{Job, JobSnapshot, JobState};
use crate::models::recognition::RecognitionResult;
use crate::models::slip::ParsedSlip;
use crate::services::ocr::{EngineOutput, OcrEngine};
use crate::services::slip;
use crate::services::storage::{JobStore, StorageError};

/// Error detail written onto queued jobs cancelled before dispatch.
pub const CANCELLED_DETAIL: &str = "cancelled before dispatch";

/// Tuning for the worker pool, timeout, and retry policy.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub worker_count: usize,
    pub job_timeout: Duration,
    pub max_retries: i32,
    pub retry_backoff: Duration,
    /// Regions below this confidence are excluded from slip parsing.
    pub min_confidence: f64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            job_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            min_confidence: 0.3,
        }
    }
}

/// Terminal outcome reported for a Running job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The recognition result has already been persisted under the job id.
    Succeeded,
    Failed(String),
}

struct UserState {
    in_flight: u32,
    last_activity: DateTime<Utc>,
}

impl UserState {
    fn new() -> Self {
        Self {
            in_flight: 0,
            last_activity: Utc::now(),
        }
    }
}

/// Tracks every slip-reading job from submission to terminal state.
///
/// One in-flight job per user; a fixed pool of worker tasks drains a FIFO
/// channel; transient engine failures retry with backoff up to a bound;
/// each engine invocation runs under a timeout and is abandoned on expiry.
pub struct JobManager {
    store: Arc<JobStore>,
    engine: Arc<dyn OcrEngine>,
    policy: LifecyclePolicy,
    jobs: DashMap<Uuid, Job>,
    users: DashMap<String, UserState>,
    queue_tx: mpsc::UnboundedSender<Uuid>,
}

impl JobManager {
    /// Reconcile orphaned jobs, hydrate persisted records, and spawn the
    /// worker pool. Runs before any new submission is accepted.
    pub async fn start(
        store: Arc<JobStore>,
        engine: Arc<dyn OcrEngine>,
        policy: LifecyclePolicy,
    ) -> Result<Arc<Self>, StorageError> {
        let report = store.recover_interrupted().await?;
        if report.reconciled > 0 {
            tracing::warn!(
                count = report.reconciled,
                "reconciled orphaned jobs from previous run"
            );
        }

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            store,
            engine,
            policy,
            jobs: DashMap::new(),
            users: DashMap::new(),
            queue_tx,
        });

        for job in report.jobs {
            manager.jobs.insert(job.id, job);
        }

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        for worker_id in 0..manager.policy.worker_count.max(1) {
            let mgr = Arc::clone(&manager);
            let rx = Arc::clone(&queue_rx);
            tokio::spawn(async move { mgr.worker_loop(worker_id, rx).await });
        }

        Ok(manager)
    }

    /// Accept an image for reading. Fails with `Busy` while the user already
    /// has a job in flight.
    pub async fn submit(&self, user_id: &str, image_bytes: &[u8]) -> Result<Uuid, SubmitError> {
        // Atomic check-and-increment on the user's shard; the guard must not
        // be held across an await.
        {
            let mut entry = self
                .users
                .entry(user_id.to_string())
                .or_insert_with(UserState::new);
            if entry.in_flight >= 1 {
                return Err(SubmitError::Busy);
            }
            entry.in_flight += 1;
            entry.last_activity = Utc::now();
        }

        let job_id = Uuid::new_v4();
        let persisted: Result<Job, StorageError> = async {
            let image_path = self.store.put_image(job_id, image_bytes).await?;
            let job = Job::new(job_id, user_id, &image_path);
            self.store.put_job(&job).await?;
            Ok(job)
        }
        .await;

        let job = match persisted {
            Ok(job) => job,
            Err(e) => {
                self.release_user(user_id);
                return Err(e.into());
            }
        };

        self.jobs.insert(job_id, job);

        if self.queue_tx.send(job_id).is_err() {
            // Worker pool is gone; nothing will ever pick this up.
            tracing::error!(job_id = %job_id, "worker pool unavailable, failing job");
            self.fail_unclaimed(job_id, "worker pool unavailable").await;
            return Err(SubmitError::Unavailable);
        }

        metrics::counter!("slip_jobs_submitted_total").increment(1);
        metrics::gauge!("slip_queue_depth").increment(1.0);
        tracing::info!(job_id = %job_id, user_id, "slip job queued");

        Ok(job_id)
    }

    /// Current state of a job. Never blocks; unknown ids are `NotFound`.
    pub fn poll(&self, job_id: Uuid) -> Result<JobSnapshot, LifecycleError> {
        self.jobs
            .get(&job_id)
            .map(|job| JobSnapshot::from(&*job))
            .ok_or(LifecycleError::NotFound)
    }

    /// Move a Running job to its terminal state, persist it, and release the
    /// owning user's slot. Any other starting state is `InvalidTransition`.
    pub async fn advance(&self, job_id: Uuid, outcome: JobOutcome) -> Result<(), LifecycleError> {
        let job = {
            let mut entry = self.jobs.get_mut(&job_id).ok_or(LifecycleError::NotFound)?;
            if entry.state != JobState::Running {
                return Err(LifecycleError::InvalidTransition { from: entry.state });
            }
            match &outcome {
                JobOutcome::Succeeded => {
                    entry.state = JobState::Succeeded;
                    entry.error = None;
                }
                JobOutcome::Failed(detail) => {
                    entry.state = JobState::Failed;
                    entry.error = Some(detail.clone());
                }
            }
            entry.completed_at = Some(Utc::now());
            entry.clone()
        };

        // Release the slot as soon as the in-memory state is terminal; the
        // persisted record follows.
        self.release_user(&job.user_id);
        self.store.put_job(&job).await?;

        match job.state {
            JobState::Succeeded => metrics::counter!("slip_jobs_completed_total").increment(1),
            _ => metrics::counter!("slip_jobs_failed_total").increment(1),
        }

        Ok(())
    }

    /// Cancel a job that has not been dispatched yet. Running jobs cannot be
    /// interrupted; they fall to the timeout policy instead.
    pub async fn cancel(&self, job_id: Uuid) -> Result<JobSnapshot, LifecycleError> {
        let job = {
            let mut entry = self.jobs.get_mut(&job_id).ok_or(LifecycleError::NotFound)?;
            if entry.state != JobState::Queued {
                return Err(LifecycleError::InvalidTransition { from: entry.state });
            }
            entry.state = JobState::Failed;
            entry.error = Some(CANCELLED_DETAIL.to_string());
            entry.completed_at = Some(Utc::now());
            entry.clone()
        };

        self.release_user(&job.user_id);
        self.store.put_job(&job).await?;
        metrics::gauge!("slip_queue_depth").decrement(1.0);
        metrics::counter!("slip_jobs_failed_total").increment(1);
        tracing::info!(job_id = %job_id, "queued job cancelled");

        Ok(JobSnapshot::from(&job))
    }

    /// The user's current in-flight count (0 or 1).
    pub fn in_flight(&self, user_id: &str) -> u32 {
        self.users.get(user_id).map(|u| u.in_flight).unwrap_or(0)
    }

    async fn worker_loop(
        self: Arc<Self>,
        worker_id: usize,
        queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>,
    ) {
        loop {
            let job_id = {
                let mut rx = queue_rx.lock().await;
                match rx.recv().await {
                    Some(id) => id,
                    None => break,
                }
            };
            metrics::gauge!("slip_queue_depth").decrement(1.0);

            if let Err(e) = self.process(worker_id, job_id).await {
                tracing::error!(job_id = %job_id, error = %e, "job processing error");
            }
        }
        tracing::debug!(worker_id, "worker stopped");
    }

    async fn process(&self, worker_id: usize, job_id: Uuid) -> Result<(), LifecycleError> {
        // Claim: Queued -> Running. Cancelled jobs are skipped here.
        let job = {
            let mut entry = match self.jobs.get_mut(&job_id) {
                Some(entry) => entry,
                None => return Ok(()),
            };
            if entry.state != JobState::Queued {
                return Ok(());
            }
            entry.state = JobState::Running;
            entry.clone()
        };
        self.store.put_job(&job).await?;

        tracing::info!(
            worker_id,
            job_id = %job_id,
            user_id = %job.user_id,
            "processing slip job"
        );

        let image = match self.store.get_image(job_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.advance(
                    job_id,
                    JobOutcome::Failed(format!("stored image unreadable: {e}")),
                )
                .await?;
                return Ok(());
            }
        };

        let started = std::time::Instant::now();
        let outcome = self.invoke_engine(job_id, &image).await;
        metrics::histogram!("slip_processing_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(output) => {
                let result =
                    RecognitionResult::from_regions(job_id, output.regions, &output.engine_version);
                if let Err(e) = self.store.put_result(&result).await {
                    self.advance(
                        job_id,
                        JobOutcome::Failed(format!("failed to persist result: {e}")),
                    )
                    .await?;
                    return Ok(());
                }

                let lines = result.lines_above(self.policy.min_confidence);
                let legs = slip::parse_slip_lines(&lines);
                if !legs.is_empty() {
                    let parsed = ParsedSlip::new(job_id, legs);
                    if let Err(e) = self.store.put_slip(&parsed).await {
                        tracing::warn!(job_id = %job_id, error = %e, "failed to persist parsed slip");
                    }
                }

                self.advance(job_id, JobOutcome::Succeeded).await?;
                tracing::info!(
                    job_id = %job_id,
                    regions = result.regions.len(),
                    chars = result.full_text.len(),
                    "slip job succeeded"
                );
            }
            Err(detail) => {
                self.advance(job_id, JobOutcome::Failed(detail.clone())).await?;
                tracing::warn!(job_id = %job_id, error = %detail, "slip job failed");
            }
        }

        Ok(())
    }

    /// One engine invocation per attempt, each under the job timeout.
    /// Transient failures back off exponentially up to the retry bound;
    /// a timeout spends the job's clock budget and is terminal.
    async fn invoke_engine(&self, job_id: Uuid, image: &[u8]) -> Result<EngineOutput, String> {
        let mut attempt: i32 = 0;
        loop {
            match timeout(self.policy.job_timeout, self.engine.recognize(image)).await {
                Err(_) => {
                    // The in-flight invocation is dropped; the engine offers
                    // no interruption primitive beyond abandoning the call.
                    return Err(format!(
                        "OCR timed out after {} ms",
                        self.policy.job_timeout.as_millis()
                    ));
                }
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(e)) if e.retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    self.bump_retry(job_id).await;
                    let backoff = self.policy.retry_backoff * 2u32.pow((attempt - 1) as u32);
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient OCR failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Ok(Err(e)) => return Err(e.to_string()),
            }
        }
    }

    async fn bump_retry(&self, job_id: Uuid) {
        let job = self.jobs.get_mut(&job_id).map(|mut entry| {
            entry.retry_count += 1;
            entry.clone()
        });
        if let Some(job) = job {
            if let Err(e) = self.store.put_job(&job).await {
                tracing::warn!(job_id = %job_id, error = %e, "failed to persist retry count");
            }
        }
    }

    /// Fail a job that never reached Running (queue handoff broke).
    async fn fail_unclaimed(&self, job_id: Uuid, detail: &str) {
        let job = self.jobs.get_mut(&job_id).and_then(|mut entry| {
            if entry.state != JobState::Queued {
                return None;
            }
            entry.state = JobState::Failed;
            entry.error = Some(detail.to_string());
            entry.completed_at = Some(Utc::now());
            Some(entry.clone())
        });
        if let Some(job) = job {
            self.release_user(&job.user_id);
            if let Err(e) = self.store.put_job(&job).await {
                tracing::warn!(job_id = %job_id, error = %e, "failed to persist job failure");
            }
        }
    }

    fn release_user(&self, user_id: &str) {
        if let Some(mut entry) = self.users.get_mut(user_id) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            entry.last_activity = Utc::now();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("user already has a slip in flight")]
    Busy,

    #[error("worker pool unavailable")]
    Unavailable,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("unknown job")]
    NotFound,

    #[error("job is {from} and cannot make that transition")]
    InvalidTransition { from: JobState },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
