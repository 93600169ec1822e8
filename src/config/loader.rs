use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::error::ConfigError;
use super::models::{
    BackupJob, Configuration, JobsDocument, LegacyDocument, DEFAULT_DB_PORT, DEFAULT_JOB_NAME,
    DEFAULT_REGION,
};

/// Read and parse a configuration file
pub async fn load_config(path: &Path) -> Result<Configuration, ConfigError> {
    debug!("Loading configuration from: {}", path.display());

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    parse_config(&content)
}

/// Parse either document shape and validate the result.
///
/// A document with a `backups` key is the multi-job form; one with `S3` or
/// `MYSQL` sections is the single-job form and yields one job named
/// [`DEFAULT_JOB_NAME`].
pub fn parse_config(content: &str) -> Result<Configuration, ConfigError> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;

    let config: Configuration = if value.get("backups").is_some() {
        serde_yaml::from_value::<JobsDocument>(value)?.into()
    } else if value.get("S3").is_some() || value.get("MYSQL").is_some() {
        serde_yaml::from_value::<LegacyDocument>(value)?.into()
    } else {
        return Err(ConfigError::Invalid(
            "expected a `backups` list or `S3`/`MYSQL` sections".to_string(),
        ));
    };

    validate_configuration(&config)?;
    Ok(config)
}

/// Build a single-job configuration from the process environment
pub fn config_from_env() -> Result<Configuration, ConfigError> {
    config_from_lookup(|key| std::env::var(key).ok())
}

pub(crate) fn config_from_lookup<F>(lookup: F) -> Result<Configuration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &'static str| -> Result<String, ConfigError> {
        lookup(key)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnv(key))
    };
    let optional = |key: &'static str| lookup(key).filter(|v| !v.is_empty());

    let db_port = match optional("MARIADB_PORT") {
        Some(port) => port.trim().parse().map_err(|e| ConfigError::InvalidEnv {
            name: "MARIADB_PORT",
            reason: format!("{}", e),
        })?,
        None => DEFAULT_DB_PORT,
    };

    let tls_insecure = match optional("AWS_S3_TLS_INSECURE") {
        Some(flag) => parse_bool(&flag).ok_or_else(|| ConfigError::InvalidEnv {
            name: "AWS_S3_TLS_INSECURE",
            reason: format!("expected a boolean, got '{}'", flag),
        })?,
        None => false,
    };

    let extra_dump_args = optional("MYSQLDUMP_EXTRA_ARGS")
        .map(|args| args.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let job = BackupJob {
        name: optional("BACKUP_NAME").unwrap_or_else(|| DEFAULT_JOB_NAME.to_string()),
        endpoint: required("AWS_URL")?,
        access_key: required("AWS_ACCESS_KEY_ID")?,
        secret_key: required("AWS_SECRET_ACCESS_KEY")?,
        region: optional("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
        bucket: required("AWS_BUCKET")?,
        tls_insecure,
        db_host: required("MARIADB_HOST")?,
        db_port,
        db_user: required("MARIADB_USER")?,
        db_password: optional("MARIADB_PASSWORD").unwrap_or_default(),
        db_name: optional("MARIADB_DATABASE"),
        extra_dump_args,
    };

    let config = Configuration {
        backups: vec![job],
        log_level: None,
    };
    validate_configuration(&config)?;
    Ok(config)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn validate_configuration(config: &Configuration) -> Result<(), ConfigError> {
    validate_no_duplicate_job_names(&config.backups)?;

    for (index, job) in config.backups.iter().enumerate() {
        let missing = [
            ("name", job.name.trim()),
            ("endpoint", job.endpoint.trim()),
            ("bucket", job.bucket.trim()),
            ("db_host", job.db_host.trim()),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty());

        if let Some((field, _)) = missing {
            return Err(ConfigError::Invalid(format!(
                "backup at position {} has an empty `{}`",
                index, field
            )));
        }
    }

    Ok(())
}

/// Names double as upload key prefixes, so they must be unique
fn validate_no_duplicate_job_names(jobs: &[BackupJob]) -> Result<(), ConfigError> {
    let mut seen = HashMap::new();
    let mut duplicates = Vec::new();

    for (index, job) in jobs.iter().enumerate() {
        if let Some(&first_index) = seen.get(&job.name) {
            duplicates.push((job.name.clone(), first_index, index));
        } else {
            seen.insert(job.name.clone(), index);
        }
    }

    if duplicates.is_empty() {
        return Ok(());
    }

    let mut error_msg = String::from("Duplicate backup names detected in configuration:\n");
    for (name, first_idx, dup_idx) in duplicates {
        error_msg.push_str(&format!(
            "  - Backup '{}' appears at positions {} and {}\n",
            name, first_idx, dup_idx
        ));
    }
    error_msg.push_str("\nEach backup must have a unique name.");

    Err(ConfigError::DuplicateJob(error_msg))
}
