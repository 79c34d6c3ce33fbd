use crate::config::LoggingConfig;
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt};

const ENV_LOG: &str = "SCHEDULER_LOG";

/// Sends tracing output to the configured log file; the terminal belongs to
/// the UI while the app runs. `SCHEDULER_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    if let Some(parent) = config.path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.path)?;

    let filter = EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(io::Error::other)
}
