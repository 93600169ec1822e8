use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::BackupJob;

pub const ALL_DATABASES_FLAG: &str = "--all-databases";

/// Environment variable handed to the dump utility when a database is named
pub const DATABASE_ENV_VAR: &str = "MYSQL_DATABASE";

/// Arguments for one dump invocation, in order:
/// connection flags, result file, database selection, then extra arguments.
pub fn build_dump_args(job: &BackupJob, artifact: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-h".into(),
        job.db_host.clone().into(),
        "-P".into(),
        job.db_port.to_string().into(),
        "-u".into(),
        job.db_user.clone().into(),
        format!("--password={}", job.db_password).into(),
    ];

    let mut result_file = OsString::from("--result-file=");
    result_file.push(artifact.as_os_str());
    args.push(result_file);

    match &job.db_name {
        Some(db_name) => args.push(db_name.into()),
        None => args.push(ALL_DATABASES_FLAG.into()),
    }

    args.extend(job.extra_dump_args.iter().map(OsString::from));
    args
}

/// Assemble the dump command without starting it
pub fn dump_command(dump_path: &Path, job: &BackupJob, artifact: &Path) -> Command {
    let mut command = Command::new(dump_path);
    command.args(build_dump_args(job, artifact));

    if let Some(db_name) = &job.db_name {
        command.env(DATABASE_ENV_VAR, db_name);
    }

    command.kill_on_drop(true);
    command
}

/// Run the dump utility for one job and wait for it to exit.
///
/// The dump itself lands in `artifact` through `--result-file`; the captured
/// output is only used for diagnostics.
pub async fn run_dump(dump_path: &Path, job: &BackupJob, artifact: &Path) -> Result<()> {
    info!(
        "Dumping {} from {}:{} to {}",
        job.db_name.as_deref().unwrap_or("all databases"),
        job.db_host,
        job.db_port,
        artifact.display()
    );

    let output = dump_command(dump_path, job, artifact)
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", dump_path.display()))?;

    check_dump_output(dump_path, &output)?;

    debug!(
        "Dump output for {}: {}",
        job.name,
        String::from_utf8_lossy(&output.stdout).trim()
    );
    Ok(())
}

fn check_dump_output(dump_path: &Path, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    Err(anyhow::anyhow!(
        "{} failed with status: {}\nStdout: {}\nStderr: {}",
        dump_path.display(),
        output.status,
        String::from_utf8_lossy(&output.stdout).trim(),
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}
