//! Diagnostics for the weighbridge backend.
//!
//! Provides:
//! - **Logging setup**: console plus daily rolling file under `<data_dir>/logs`
//! - **Log rotation helpers**: pruning old daily files at startup
//! - **About info**: version, build timestamp, git SHA, platform
//! - **Store health**: schema version, database size, ticket counts

use rusqlite::Connection;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::db::DbState;
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of daily log files to retain.
pub const MAX_LOG_FILES: usize = 14;

/// File name prefix of the rolling log (`weighbridge.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "weighbridge";

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

pub fn get_log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Install the global subscriber: `EnvFilter` (`RUST_LOG` wins over
/// `default_filter`), a console layer and a daily rolling file layer.
///
/// The returned guard flushes the file writer when dropped; hold it for the
/// life of the process.
pub fn init_tracing(data_dir: &Path, default_filter: &str) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER));

    let log_dir = get_log_dir(data_dir);
    prune_old_logs(&log_dir);
    fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let prefix = format!("{LOG_FILE_PREFIX}.");
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.starts_with(&prefix) {
                        let modified = entry
                            .metadata()
                            .ok()
                            .and_then(|m| m.modified().ok())
                            .unwrap_or(std::time::UNIX_EPOCH);
                        log_files.push((path, modified));
                    }
                }
            }
        }
    }

    // Newest first; daily names break ties
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Store health
// ---------------------------------------------------------------------------

fn count(conn: &Connection, sql: &str) -> Result<i64, StoreError> {
    Ok(conn.query_row(sql, [], |row| row.get(0))?)
}

/// Schema version, database size and ticket counts.
pub fn get_store_health(db: &DbState) -> Result<Value, StoreError> {
    let conn = db.lock();

    let schema_version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);
    let db_size = fs::metadata(&db.db_path).map(|m| m.len()).unwrap_or(0);

    Ok(json!({
        "schemaVersion": schema_version,
        "dbPath": db.db_path.display().to_string(),
        "dbSizeBytes": db_size,
        "transactions": count(&conn, "SELECT COUNT(*) FROM transactions")?,
        "openPartials": count(&conn, "SELECT COUNT(*) FROM transactions WHERE status = 'partial'")?,
        "preRegistrations": count(&conn, "SELECT COUNT(*) FROM pre_registrations")?,
        "materials": count(&conn, "SELECT COUNT(*) FROM materials")?,
        "destinations": count(&conn, "SELECT COUNT(*) FROM destinations")?,
    }))
}
