use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::BackupJob;
use crate::core::dump;
use crate::core::storage::{ObjectStore, StorageConnector, DUMP_CONTENT_TYPE};

/// Outcome of one job run, used for logging and liveness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub job_name: String,
    pub dump_succeeded: bool,
    pub upload_succeeded: bool,
    pub artifact_path: PathBuf,
}

impl RunResult {
    fn new(job_name: &str, artifact_path: PathBuf) -> Self {
        Self {
            job_name: job_name.to_string(),
            dump_succeeded: false,
            upload_succeeded: false,
            artifact_path,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.dump_succeeded && self.upload_succeeded
    }
}

/// Runs one backup job end to end: dump, upload, clean up
pub struct JobRunner {
    dump_path: PathBuf,
    scratch_dir: PathBuf,
    connector: Arc<dyn StorageConnector>,
}

impl JobRunner {
    pub fn new(
        dump_path: PathBuf,
        scratch_dir: PathBuf,
        connector: Arc<dyn StorageConnector>,
    ) -> Self {
        Self {
            dump_path,
            scratch_dir,
            connector,
        }
    }

    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    /// Execute one job. Failures are logged and reported in the result;
    /// they never propagate, so the caller can move on to the next job.
    pub async fn run_job(&self, job: &BackupJob) -> RunResult {
        let timestamp = run_timestamp();
        self.run_job_at(job, &timestamp).await
    }

    pub(crate) async fn run_job_at(&self, job: &BackupJob, timestamp: &str) -> RunResult {
        info!("Starting backup: {}", job.name);

        let artifact_path = self.artifact_path(&job.name, timestamp);
        let mut result = RunResult::new(&job.name, artifact_path.clone());

        match self.dump(job, &artifact_path).await {
            Ok(()) => {
                result.dump_succeeded = true;
                info!("Dump complete: {}", job.name);
            }
            Err(e) => error!("Error running dump for {}: {:#}", job.name, e),
        }

        if result.dump_succeeded {
            let key = upload_key(&job.name, timestamp);

            match self.upload(job, &artifact_path, &key).await {
                Ok(()) => {
                    result.upload_succeeded = true;
                    info!(
                        "Backup complete: {} uploaded to {}/{} at {}",
                        job.name,
                        job.bucket,
                        key,
                        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
                    );
                }
                Err(e) => error!("Error uploading backup for {}: {:#}", job.name, e),
            }
        }

        remove_artifact(&artifact_path).await;
        result
    }

    async fn dump(&self, job: &BackupJob, artifact_path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .with_context(|| {
                format!("Failed to create scratch directory {}", self.scratch_dir.display())
            })?;

        dump::run_dump(&self.dump_path, job, artifact_path).await
    }

    async fn upload(&self, job: &BackupJob, artifact_path: &Path, key: &str) -> Result<()> {
        let store = self
            .connector
            .connect(job)
            .await
            .context("Failed to set up object store client")?;

        ensure_bucket(store.as_ref(), &job.bucket, &job.region).await?;

        store
            .upload_file(&job.bucket, key, artifact_path, DUMP_CONTENT_TYPE)
            .await
    }

    /// Scratch file for one run; unique per job name and timestamp
    pub fn artifact_path(&self, job_name: &str, timestamp: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("{}_{}.sql", sanitize_artifact_name(job_name), timestamp))
    }
}

/// Create the bucket when it is missing. Exactly one creation attempt.
pub async fn ensure_bucket(store: &dyn ObjectStore, bucket: &str, region: &str) -> Result<()> {
    if store.bucket_exists(bucket).await? {
        debug!("Found bucket {}", bucket);
        return Ok(());
    }

    info!("Bucket {} does not exist, creating", bucket);
    store.create_bucket(bucket, region).await?;
    info!("Created bucket {}", bucket);
    Ok(())
}

/// Object key for a run: `<job name>/<timestamp>.sql`
pub fn upload_key(job_name: &str, timestamp: &str) -> String {
    format!("{}/{}.sql", job_name, timestamp)
}

/// RFC 3339 UTC timestamp, second precision
pub fn run_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No artifact left at {}", path.display())
        }
        Err(e) => warn!("Error removing file {}: {}", path.display(), e),
    }
}

/// Make a job name safe to use as a single file name component
fn sanitize_artifact_name(name: &str) -> String {
    let sanitized = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('_')
        .chars()
        .take(200)
        .collect::<String>();

    if sanitized.is_empty() {
        "backup".to_string()
    } else {
        sanitized
    }
}
