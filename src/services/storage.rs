use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::models::job::{Job, JobState};
use crate::models::recognition::RecognitionResult;
use crate::models::slip::ParsedSlip;

const JOB_FILE: &str = "job.json";
const IMAGE_FILE: &str = "image.bin";
const RESULT_FILE: &str = "result.json";
const SLIP_FILE: &str = "slip.json";

/// Error detail written onto jobs found non-terminal after a restart.
pub const INTERRUPTED_DETAIL: &str = "interrupted by restart";

/// Durable per-job storage under a mounted volume.
///
/// Layout: `<root>/jobs/<job_id>/{job.json,image.bin,result.json,slip.json}`.
/// Every write lands in a temp file in the target directory, is synced, and
/// is renamed into place, so readers never observe a partial record.
pub struct JobStore {
    root: PathBuf,
}

/// Outcome of the startup reconciliation scan.
pub struct RecoveryReport {
    /// Every persisted job record, post-reconciliation.
    pub jobs: Vec<Job>,
    /// How many records were rewritten from Queued/Running to Failed.
    pub reconciled: usize,
}

impl JobStore {
    /// Open the store, creating the directory tree on first use.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(root.join("jobs")).await?;
        Ok(Self { root })
    }

    fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("jobs").join(job_id.to_string())
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
    ) -> Result<T, StorageError> {
        let bytes = fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist a job record.
    ///
    /// Re-putting identical content is a no-op. Writes that would regress the
    /// lifecycle order, or alter a terminal record, are rejected.
    pub async fn put_job(&self, job: &Job) -> Result<(), StorageError> {
        let path = self.job_dir(job.id).join(JOB_FILE);
        match self.read_json::<Job>(&path).await {
            Ok(existing) => {
                if serde_json::to_value(&existing)? == serde_json::to_value(job)? {
                    return Ok(());
                }
                if existing.state.is_terminal() || job.state.rank() < existing.state.rank() {
                    return Err(StorageError::Conflict(format!(
                        "job {} is {} and cannot be rewritten as {}",
                        job.id, existing.state, job.state
                    )));
                }
            }
            Err(StorageError::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.write_atomic(&path, &serde_json::to_vec_pretty(job)?).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, StorageError> {
        self.read_json(&self.job_dir(job_id).join(JOB_FILE)).await
    }

    /// Persist a recognition result. Results are immutable: an identical
    /// re-put is a no-op, differing content for the same job is a conflict.
    pub async fn put_result(&self, result: &RecognitionResult) -> Result<(), StorageError> {
        let path = self.job_dir(result.job_id).join(RESULT_FILE);
        match self.read_json::<RecognitionResult>(&path).await {
            Ok(existing) => {
                if serde_json::to_value(&existing)? == serde_json::to_value(result)? {
                    Ok(())
                } else {
                    Err(StorageError::Conflict(format!(
                        "result for job {} already written with different content",
                        result.job_id
                    )))
                }
            }
            Err(StorageError::NotFound) => {
                self.write_atomic(&path, &serde_json::to_vec_pretty(result)?)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_result(&self, job_id: Uuid) -> Result<RecognitionResult, StorageError> {
        self.read_json(&self.job_dir(job_id).join(RESULT_FILE)).await
    }

    /// Persist a parsed slip, with the same immutability contract as results.
    pub async fn put_slip(&self, slip: &ParsedSlip) -> Result<(), StorageError> {
        let path = self.job_dir(slip.job_id).join(SLIP_FILE);
        match self.read_json::<ParsedSlip>(&path).await {
            Ok(existing) => {
                if serde_json::to_value(&existing)? == serde_json::to_value(slip)? {
                    Ok(())
                } else {
                    Err(StorageError::Conflict(format!(
                        "slip for job {} already written with different content",
                        slip.job_id
                    )))
                }
            }
            Err(StorageError::NotFound) => {
                self.write_atomic(&path, &serde_json::to_vec_pretty(slip)?).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_slip(&self, job_id: Uuid) -> Result<ParsedSlip, StorageError> {
        self.read_json(&self.job_dir(job_id).join(SLIP_FILE)).await
    }

    /// Store the raw input image; returns its path relative to the root.
    pub async fn put_image(&self, job_id: Uuid, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.job_dir(job_id).join(IMAGE_FILE);
        self.write_atomic(&path, bytes).await?;
        Ok(format!("jobs/{}/{}", job_id, IMAGE_FILE))
    }

    pub async fn get_image(&self, job_id: Uuid) -> Result<Vec<u8>, StorageError> {
        fs::read(self.job_dir(job_id).join(IMAGE_FILE))
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound
                } else {
                    StorageError::Io(e)
                }
            })
    }

    /// Startup reconciliation: any job record left Queued or Running was
    /// orphaned by a crash (the in-process queue did not survive) and is
    /// rewritten as Failed. Returns every record for in-memory hydration.
    pub async fn recover_interrupted(&self) -> Result<RecoveryReport, StorageError> {
        let mut jobs = Vec::new();
        let mut reconciled = 0usize;

        let mut entries = fs::read_dir(self.root.join("jobs")).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(JOB_FILE);
            let mut job: Job = match self.read_json(&path).await {
                Ok(job) => job,
                Err(StorageError::NotFound) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable job record");
                    continue;
                }
            };

            if job.state.is_in_flight() {
                job.state = JobState::Failed;
                job.error = Some(INTERRUPTED_DETAIL.to_string());
                job.completed_at = Some(Utc::now());
                self.write_atomic(&path, &serde_json::to_vec_pretty(&job)?)
                    .await?;
                // A result may only exist for a succeeded job; drop anything
                // a crash left behind mid-completion.
                let _ = fs::remove_file(entry.path().join(RESULT_FILE)).await;
                let _ = fs::remove_file(entry.path().join(SLIP_FILE)).await;
                reconciled += 1;
            }
            jobs.push(job);
        }

        Ok(RecoveryReport { jobs, reconciled })
    }

    /// Check the volume is present and writable (for health checks).
    pub async fn health_check(&self) -> Result<(), StorageError> {
        let probe = self.root.join(".probe");
        fs::write(&probe, b"ok").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found")]
    NotFound,

    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
