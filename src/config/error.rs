use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("{0}")]
    DuplicateJob(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
