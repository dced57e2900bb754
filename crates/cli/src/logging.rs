use std::fs;

use anyhow::{Context, Result};
use directories::BaseDirs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs go to `<data_dir>/dsweb/logs/dsweb.log` so stdout carries only model output.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(verbose: bool) -> Result<WorkerGuard> {
    let dir = BaseDirs::new()
        .map(|b| b.data_dir().join("dsweb").join("logs"))
        .context("no home directory for log files")?;
    fs::create_dir_all(&dir).with_context(|| format!("create log dir: {}", dir.display()))?;

    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, "dsweb.log"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false).compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(stderr_layer)
        .init();
    Ok(guard)
}
