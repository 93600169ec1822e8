use std::sync::Arc;
use tracing::{info, warn};

use crate::config::BackupJob;
use crate::core::{JobRunner, RunResult};
use crate::state::LivenessState;

/// Runs the jobs of one cycle in order and reports each outcome to the
/// liveness state.
pub struct JobExecutor {
    runner: Arc<JobRunner>,
    liveness: Arc<LivenessState>,
}

impl JobExecutor {
    pub fn new(runner: Arc<JobRunner>, liveness: Arc<LivenessState>) -> Self {
        Self { runner, liveness }
    }

    /// A failed job is recorded and skipped; the rest of the cycle still runs.
    pub async fn run_cycle(&self, jobs: &[BackupJob]) -> Vec<RunResult> {
        let mut results = Vec::with_capacity(jobs.len());

        for job in jobs {
            let result = self.runner.run_job(job).await;
            self.liveness.record(result.succeeded());

            if !result.succeeded() {
                warn!("Backup failed, continuing with next job: {}", job.name);
            }
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.succeeded()).count();
        info!(
            "Backup cycle finished: {} succeeded, {} failed",
            results.len() - failed,
            failed
        );

        results
    }
}
