use anyhow::Context;
use chrono::Local;
use pilot_engine::config::{LogFormat, LoggingConfig};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. Events go to stderr so stdout carries only
/// results, or to a timestamped file under `logs_dir` when `to_file` is set.
/// Returns the log file path, if any.
pub fn init(config: &LoggingConfig, logs_dir: &Path) -> anyhow::Result<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (writer, ansi, log_file) = if config.to_file {
        let path = log_file_path(logs_dir);
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("creating log directory {}", logs_dir.display()))?;
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        (BoxMakeWriter::new(Mutex::new(file)), false, Some(path))
    } else {
        (
            BoxMakeWriter::new(std::io::stderr),
            std::io::stderr().is_terminal(),
            None,
        )
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(writer).with_ansi(ansi))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer).with_current_span(true))
            .try_init(),
    }
    .context("installing tracing subscriber")?;

    Ok(log_file)
}

fn log_file_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(format!("pilot_{}.log", Local::now().format("%Y%m%d_%H%M%S")))
}
