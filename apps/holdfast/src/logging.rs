//! File-based tracing setup, initialized once from CLI flags.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

}

pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = build_env_filter(config.level);
    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_target(config.level >= LogLevel::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("tracing subscriber already set")?;

    let _ = GUARD.set(guard);
    INIT.set(()).ok();
    Ok(())
}

fn build_env_filter(level: LogLevel) -> EnvFilter {
    if let Ok(filter) = std::env::var("HOLDFAST_LOG_FILTER") {
        return EnvFilter::new(filter);
    }
    // Dependency targets stay at warn unless the override variable is used.
    EnvFilter::new(format!(
        "warn,holdfast={level},holdfast_client={level}",
        level = level.as_str()
    ))
}
