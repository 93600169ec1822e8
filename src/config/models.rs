use serde::{Deserialize, Deserializer};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/mysql-s3/config.yaml";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Job name used when the configuration describes a single unnamed job
/// (legacy document or environment variables).
pub const DEFAULT_JOB_NAME: &str = "default";

#[inline]
fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

#[inline]
fn default_db_port() -> u16 {
    DEFAULT_DB_PORT
}

/// Loaded configuration snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Backup jobs in file order
    pub backups: Vec<BackupJob>,

    /// Optional log level override (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

impl Configuration {
    pub fn job(&self, name: &str) -> Option<&BackupJob> {
        self.backups.iter().find(|j| j.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }
}

/// A single named backup job: where to dump from and where to upload to
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BackupJob {
    /// Unique job name, also the first segment of every upload key
    pub name: String,

    /// Object store endpoint, with or without scheme
    #[serde(alias = "aws_url")]
    pub endpoint: String,

    #[serde(alias = "aws_access_key_id")]
    pub access_key: String,

    #[serde(alias = "aws_secret_access_key")]
    pub secret_key: String,

    #[serde(default = "default_region", alias = "aws_region")]
    pub region: String,

    #[serde(alias = "aws_bucket", alias = "bucket_name")]
    pub bucket: String,

    /// Skip TLS certificate verification towards the object store
    #[serde(default, alias = "aws_s3_tls_insecure")]
    pub tls_insecure: bool,

    #[serde(alias = "mariadb_host")]
    pub db_host: String,

    #[serde(
        default = "default_db_port",
        alias = "mariadb_port",
        deserialize_with = "deserialize_port"
    )]
    pub db_port: u16,

    #[serde(alias = "mariadb_user")]
    pub db_user: String,

    #[serde(default, alias = "mariadb_password")]
    pub db_password: String,

    /// Database to dump; `None` dumps every database
    #[serde(
        default,
        alias = "mariadb_database",
        deserialize_with = "deserialize_db_name"
    )]
    pub db_name: Option<String>,

    /// Appended verbatim after the required dump arguments
    #[serde(default, alias = "mysqldump_extra_args")]
    pub extra_dump_args: Vec<String>,
}

/// Multi-job document: `backups: [...]`
#[derive(Debug, Deserialize)]
pub(crate) struct JobsDocument {
    pub backups: Vec<BackupJob>,

    #[serde(default)]
    pub log_level: Option<String>,
}

/// Single-job document with `S3` and `MYSQL` sections
#[derive(Debug, Deserialize)]
pub(crate) struct LegacyDocument {
    #[serde(rename = "S3")]
    pub s3: LegacyS3Section,

    #[serde(rename = "MYSQL")]
    pub mysql: LegacyMysqlSection,

    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LegacyS3Section {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    #[serde(default = "default_region")]
    pub aws_region: String,
    pub aws_bucket: String,
    pub aws_url: String,
    #[serde(default)]
    pub aws_s3_tls_insecure: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LegacyMysqlSection {
    pub mariadb_host: String,
    #[serde(default = "default_db_port", deserialize_with = "deserialize_port")]
    pub mariadb_port: u16,
    pub mariadb_user: String,
    #[serde(default)]
    pub mariadb_password: String,
    #[serde(default, deserialize_with = "deserialize_db_name")]
    pub mariadb_database: Option<String>,
    #[serde(default)]
    pub mysqldump_extra_args: Vec<String>,
}

impl From<LegacyDocument> for Configuration {
    fn from(doc: LegacyDocument) -> Self {
        let job = BackupJob {
            name: DEFAULT_JOB_NAME.to_string(),
            endpoint: doc.s3.aws_url,
            access_key: doc.s3.aws_access_key_id,
            secret_key: doc.s3.aws_secret_access_key,
            region: doc.s3.aws_region,
            bucket: doc.s3.aws_bucket,
            tls_insecure: doc.s3.aws_s3_tls_insecure,
            db_host: doc.mysql.mariadb_host,
            db_port: doc.mysql.mariadb_port,
            db_user: doc.mysql.mariadb_user,
            db_password: doc.mysql.mariadb_password,
            db_name: doc.mysql.mariadb_database,
            extra_dump_args: doc.mysql.mysqldump_extra_args,
        };

        Configuration {
            backups: vec![job],
            log_level: doc.log_level,
        }
    }
}

impl From<JobsDocument> for Configuration {
    fn from(doc: JobsDocument) -> Self {
        Configuration {
            backups: doc.backups,
            log_level: doc.log_level,
        }
    }
}

/// Ports show up both as numbers and as quoted strings in existing files
#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(port),
        PortValue::Text(text) => text
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid port '{}': {}", text, e))),
    }
}

fn deserialize_db_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name.filter(|n| !n.trim().is_empty()))
}
