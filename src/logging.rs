//! Logging setup with journald support on Linux.
//!
//! Logs go to the systemd journal when it is reachable, otherwise to a daily
//! rolling file when a log directory is configured, otherwise to stderr.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "ALBUMSORT_LOG";

/// Keeps the non-blocking file writer flushing until process exit.
static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialize the global subscriber. Call once at startup.
///
/// The level comes from `ALBUMSORT_LOG` (`debug`, `info`, `warn`, ... or a
/// full filter directive) and defaults to `info`.
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .try_init()
                .context("failed to install journald subscriber")?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    if let Some(log_dir) = log_dir {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "albumsort.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = FILE_GUARD.set(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init()
            .context("failed to install file subscriber")?;

        tracing::info!(dir = %log_dir.display(), "Logging initialized with file backend");
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install stderr subscriber")?;
    Ok(())
}
