//! Logging Infrastructure
//!
//! - Console output (pretty for development, JSON for production)
//! - Daily rotating application logs (deleted after [`APP_LOG_RETENTION_DAYS`])
//! - Audit logs for confirmed staff transitions (never deleted)

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// `tracing` target of audit events
pub const AUDIT_TARGET: &str = "audit";

pub const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn daily_appender(dir: &Path, prefix: &str) -> anyhow::Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)?)
}

fn console_layer(level: &str, json_format: bool) -> BoxedLayer {
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_filter(env_filter(level))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter(level))
            .boxed()
    }
}

fn file_layers(level: &str, json_format: bool, log_dir: &Path) -> anyhow::Result<Vec<BoxedLayer>> {
    let app_dir = log_dir.join("app");
    let audit_dir = log_dir.join("audit");
    fs::create_dir_all(&app_dir)?;
    fs::create_dir_all(&audit_dir)?;

    let app_log = daily_appender(&app_dir, "app")?;
    let audit_log = daily_appender(&audit_dir, "audit")?;

    // 审计事件只进 audit 文件
    let layers = if json_format {
        vec![
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(app_log)
                .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET))
                .with_filter(env_filter(level))
                .boxed(),
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(audit_log)
                .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET))
                .boxed(),
        ]
    } else {
        vec![
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(app_log)
                .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET))
                .with_filter(env_filter(level))
                .boxed(),
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(audit_log)
                .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET))
                .boxed(),
        ]
    };
    Ok(layers)
}

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug"); `RUST_LOG` wins when set
/// * `json_format` - JSON output for production
/// * `log_dir` - Optional directory for rotating file logs
///
/// Must run inside a tokio runtime when `log_dir` is set (starts the cleanup task).
pub fn init_logger_with_file(level: &str, json_format: bool, log_dir: Option<&str>) -> anyhow::Result<()> {
    let mut layers = vec![console_layer(level, json_format)];

    if let Some(dir) = log_dir {
        let dir = PathBuf::from(dir);
        layers.extend(file_layers(level, json_format, &dir)?);
        tokio::spawn(periodic_cleanup(dir));
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

/// Console only
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Delete `app.YYYY-MM-DD.log` files older than `keep_days`
pub fn cleanup_old_logs(log_dir: &Path, keep_days: i64) -> anyhow::Result<usize> {
    let app_dir = log_dir.join("app");
    if !app_dir.exists() {
        return Ok(0);
    }

    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(keep_days);
    let mut removed = 0;
    for entry in fs::read_dir(app_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let date = name
            .strip_prefix("app.")
            .and_then(|rest| rest.strip_suffix(".log"))
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
        if let Some(date) = date
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
            removed += 1;
        }
    }
    Ok(removed)
}

async fn periodic_cleanup(log_dir: PathBuf) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        ticker.tick().await;
        if let Err(e) = cleanup_old_logs(&log_dir, APP_LOG_RETENTION_DAYS) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Audit log helper - records confirmed staff operations
///
/// # Examples
/// ```ignore
/// audit_log!("pass-screen-1", "transition", "order:A1", "pending -> preparing");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($device:expr, $action:expr, $resource:expr) => {
        tracing::info!(
            target: "audit",
            device = $device,
            action = $action,
            resource = $resource,
            timestamp = chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
    ($device:expr, $action:expr, $resource:expr, $details:expr) => {
        tracing::info!(
            target: "audit",
            device = $device,
            action = $action,
            resource = $resource,
            details = $details,
            timestamp = chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
}
