use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use mysql_s3_backup::{
    config::{config_from_env, load_config, Configuration, DEFAULT_CONFIG_PATH},
    core::validate_dump_utility,
    observability::{init_logging, LogFormat, Rotation},
    service::{DaemonOptions, ServiceDaemon},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Parse an interval such as `90s`, `1.5h`, `500ms`, `2d` or `1h30m`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`, `d`. Every number needs a
/// unit, and the total must be greater than zero.
fn parse_duration(s: &str) -> Result<Duration> {
    let input = s.trim();
    if input.is_empty() {
        bail!("Empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            bail!("Invalid duration '{}': expected a number at '{}'", input, rest);
        }
        let value: f64 = number
            .parse()
            .with_context(|| format!("Invalid duration '{}'", input))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let unit_nanos: f64 = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "d" => 86_400e9,
            "" => bail!("Invalid duration '{}': missing unit after {}", input, number),
            _ => bail!(
                "Invalid duration '{}': unknown unit '{}' (use ns, us, ms, s, m, h or d)",
                input,
                unit
            ),
        };

        let nanos = (value * unit_nanos).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            bail!("Duration '{}' is too large", input);
        }
        total = total
            .checked_add(Duration::from_nanos(nanos as u64))
            .with_context(|| format!("Duration '{}' is too large", input))?;
        rest = tail;
    }

    if total.is_zero() {
        bail!("Duration must be greater than zero");
    }

    Ok(total)
}

#[derive(Parser, Debug)]
#[command(version, about, disable_version_flag = true)]
struct CliArgs {
    /// Read a single backup job from environment variables instead of a file.
    #[clap(long)]
    pub env: bool,

    /// Path to the YAML configuration file.
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Interval between backup cycles, e.g. `24h`, `1h30m`, `1.5h` or `90s`.
    #[clap(long, default_value = "24h", value_parser = parse_duration)]
    pub duration: Duration,

    /// Path to the mysqldump binary.
    #[clap(long, default_value = "/usr/bin/mysqldump")]
    pub mysqldump: PathBuf,

    /// Port of the health endpoint.
    #[clap(long, default_value_t = 8090)]
    pub port: u16,

    /// Serve the health endpoint.
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub health: bool,

    /// Directory for temporary dump files. Defaults to the system temp dir.
    #[clap(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `mysql_s3_backup=debug`. Overrides the
    /// configuration file's `log_level` at startup.
    #[clap(long)]
    pub log_level: Option<String>,

    /// Also write logs to files in this directory.
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    #[clap(long, value_enum, default_value_t = Rotation::Daily)]
    pub log_rotation: Rotation,

    #[clap(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print version.
    #[clap(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

async fn read_configuration(args: &CliArgs) -> Result<Configuration> {
    if args.env {
        config_from_env().context("Failed to read configuration from environment")
    } else {
        load_config(&args.config)
            .await
            .with_context(|| format!("Failed to load configuration from {}", args.config.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = read_configuration(&args).await;

    let log_level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().and_then(|c| c.log_level.clone()))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    init_logging(
        &log_level,
        args.log_dir.as_deref(),
        args.log_rotation,
        args.log_format,
    )?;

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };

    info!("mysql-s3-backup v{}", env!("CARGO_PKG_VERSION"));
    if args.env {
        info!("Configuration loaded from environment");
    } else {
        info!("Configuration loaded from: {}", args.config.display());
    }
    info!("{} backup(s) configured", config.backups.len());

    if let Some(log_dir) = &args.log_dir {
        info!("File logging enabled: {}", log_dir.display());
    }

    validate_dump_utility(&args.mysqldump)
        .await
        .context("Dump utility check failed")?;

    let options = DaemonOptions {
        config_path: (!args.env).then(|| args.config.clone()),
        interval: args.duration,
        dump_path: args.mysqldump.clone(),
        scratch_dir: args.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
        health_port: args.health.then_some(args.port),
    };

    ServiceDaemon::new(config, options).run().await
}
