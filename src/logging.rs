//! File logging bootstrap.
//!
//! Logs rotate under `<app_dir>/logs`. Initialization runs once per process;
//! later calls with the same directory are no-ops and a different directory
//! is rejected.

use std::path::{Path, PathBuf};

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;

use crate::error::AppError;

const LOG_FILE_BASENAME: &str = "contabil";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 7;
pub const LOG_LEVEL_ENV: &str = "CONTABIL_LOG_LEVEL";

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
  log_dir: PathBuf,
  _logger: LoggerHandle,
}

pub fn init_logging(app_dir: &Path) -> Result<(), AppError> {
  let level = std::env::var(LOG_LEVEL_ENV)
    .ok()
    .and_then(|value| normalize_level(&value))
    .unwrap_or_else(default_log_level);
  init_logging_with(level, &app_dir.join("logs"))
}

pub fn init_logging_with(level: &'static str, log_dir: &Path) -> Result<(), AppError> {
  if let Some(state) = LOGGING_STATE.get() {
    if state.log_dir == log_dir {
      return Ok(());
    }
    return Err(AppError::new(
      "LOGGING",
      format!("Log ja inicializado em {}", state.log_dir.display()),
    ));
  }

  LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, AppError> {
    std::fs::create_dir_all(log_dir)?;
    let logger = Logger::try_with_str(level)
      .map_err(|err| AppError::new("LOGGING", err.to_string()))?
      .log_to_file(FileSpec::default().directory(log_dir).basename(LOG_FILE_BASENAME))
      .rotate(
        Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
        Naming::Numbers,
        Cleanup::KeepLogFiles(MAX_LOG_FILES),
      )
      .write_mode(WriteMode::BufferAndFlush)
      .append()
      .format_for_files(flexi_logger::detailed_format)
      .start()
      .map_err(|err| AppError::new("LOGGING", err.to_string()))?;

    info!(
      "event=app_start module=logging status=ok platform={} version={} level={}",
      std::env::consts::OS,
      env!("CARGO_PKG_VERSION"),
      level
    );

    Ok(LoggingState {
      log_dir: log_dir.to_path_buf(),
      _logger: logger,
    })
  })?;

  Ok(())
}

pub fn default_log_level() -> &'static str {
  if cfg!(debug_assertions) {
    "debug"
  } else {
    "info"
  }
}

fn normalize_level(level: &str) -> Option<&'static str> {
  match level.trim().to_ascii_lowercase().as_str() {
    "trace" => Some("trace"),
    "debug" => Some("debug"),
    "info" => Some("info"),
    "warn" | "warning" => Some("warn"),
    "error" => Some("error"),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::normalize_level;

  #[test]
  fn normalize_level_accepts_known_values() {
    assert_eq!(normalize_level(" INFO "), Some("info"));
    assert_eq!(normalize_level("warning"), Some("warn"));
    assert_eq!(normalize_level("verbose"), None);
  }
}
