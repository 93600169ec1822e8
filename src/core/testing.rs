//! Test doubles shared by the runner, executor and scheduler tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::BackupJob;
use crate::core::storage::{ObjectStore, StorageConnector};

/// Database name that makes [`fake_dump_utility`] exit with status 3
pub const BROKEN_DATABASE: &str = "broken";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    BucketExists(String),
    CreateBucket { bucket: String, region: String },
    Upload {
        bucket: String,
        key: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

/// In-memory object store that records every call
#[derive(Clone, Default)]
pub struct MockStorage {
    calls: Arc<Mutex<Vec<StoreCall>>>,
    buckets: Arc<Mutex<HashSet<String>>>,
    fail_uploads: bool,
    fail_bucket_creation: bool,
}

impl MockStorage {
    pub fn with_bucket(bucket: &str) -> Self {
        let storage = Self::default();
        storage.buckets.lock().unwrap().insert(bucket.to_string());
        storage
    }

    pub fn without_buckets() -> Self {
        Self::default()
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn failing_bucket_creation(mut self) -> Self {
        self.fail_bucket_creation = true;
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// `(bucket, key, content type, bytes)` of every upload
    pub fn uploads(&self) -> Vec<(String, String, String, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Upload {
                    bucket,
                    key,
                    content_type,
                    bytes,
                } => Some((bucket, key, content_type, bytes)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StorageConnector for MockStorage {
    async fn connect(&self, _job: &BackupJob) -> Result<Box<dyn ObjectStore>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ObjectStore for MockStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.record(StoreCall::BucketExists(bucket.to_string()));
        Ok(self.buckets.lock().unwrap().contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        self.record(StoreCall::CreateBucket {
            bucket: bucket.to_string(),
            region: region.to_string(),
        });

        if self.fail_bucket_creation {
            anyhow::bail!("access denied");
        }

        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        content_type: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(file_path).await?;
        self.record(StoreCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });

        if self.fail_uploads {
            anyhow::bail!("connection reset");
        }
        Ok(())
    }
}

pub fn create_test_job(name: &str, db_name: Option<&str>) -> BackupJob {
    BackupJob {
        name: name.to_string(),
        endpoint: "minio:9000".to_string(),
        access_key: "key".to_string(),
        secret_key: "secret".to_string(),
        region: "us-east-1".to_string(),
        bucket: "backups".to_string(),
        tls_insecure: false,
        db_host: "db.local".to_string(),
        db_port: 3306,
        db_user: "root".to_string(),
        db_password: "pw".to_string(),
        db_name: db_name.map(str::to_string),
        extra_dump_args: vec!["--single-transaction".to_string()],
    }
}

/// Shell script standing in for mysqldump.
///
/// Writes ten bytes to its `--result-file=` argument, records
/// `$MYSQL_DATABASE` next to itself in `database.env`, then exits with
/// `exit_code` (or 3 when asked to dump [`BROKEN_DATABASE`]).
#[cfg(unix)]
pub fn fake_dump_utility(dir: &Path, exit_code: i32) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("mysqldump");
    let script = format!(
        r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --result-file=*) printf '0123456789' > "${{arg#--result-file=}}" ;;
  esac
done
printf '%s' "$MYSQL_DATABASE" > "$(dirname "$0")/database.env"
if [ "$MYSQL_DATABASE" = "{broken}" ]; then
  echo "mysqldump: Got error: 1049: Unknown database" >&2
  exit 3
fi
exit {exit_code}
"#,
        broken = BROKEN_DATABASE,
        exit_code = exit_code
    );

    std::fs::write(&path, script).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path
}
