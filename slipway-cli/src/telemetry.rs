//! Logging bootstrap
//!
//! Installs the global tracing subscriber once: a console layer plus an
//! ANSI-free file layer writing a timestamped log file under the log
//! directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the subscriber and returns the log file path.
///
/// The filter honors `RUST_LOG` and defaults to info for the slipway
/// crates.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_name = format!("slipway_{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let log_path = log_dir.join(file_name);
    let log_file = File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slipway_core=info,slipway_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    Ok(log_path)
}
