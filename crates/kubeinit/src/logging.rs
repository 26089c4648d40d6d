use std::fs::{self, OpenOptions};
use std::panic;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{Level, warn};
use tracing_panic::panic_hook;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, registry::Registry};

/// Install the global subscriber
///
/// Console output honours `RUST_LOG` (default `info`). When `log_file` is
/// given, a second layer appends everything at debug level, including
/// every command and its output. An unwritable log file downgrades to
/// console-only logging.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    panic::set_hook(Box::new(panic_hook));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        );

    let (file, file_error) = match log_file.map(open_log) {
        Some(Ok(handle)) => {
            let layer = fmt::layer()
                .with_writer(Arc::new(handle))
                .with_ansi(false)
                .with_target(true)
                .with_filter(
                    Targets::new()
                        .with_target("kubeinit", Level::DEBUG)
                        .with_target("kubeinit_provision", Level::DEBUG)
                        .with_target("tracing_panic", Level::ERROR),
                );
            (Some(layer), None)
        }
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    let subscriber = Registry::default().with(console).with(file);
    tracing::subscriber::set_global_default(subscriber).context("Failed to set log subscriber")?;

    if let Some(err) = file_error {
        warn!("Logging to console only: {err:#}");
    }
    Ok(())
}

fn open_log(path: &Path) -> Result<fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
