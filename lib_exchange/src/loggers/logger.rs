//! # Process Logger
//!
//! Installs a `fern` dispatcher that writes every record to stdout and to a
//! per-run log file `<log_dir>/<app_name>_<YYYY-mm-dd_HH-MM-SS>.log`.
//! Before a new file is opened, older `<app_name>_*.log` files are rotated
//! away so that only the newest previous run is kept.

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("log directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid log file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("a global logger is already installed: {0}")]
    Init(#[from] log::SetLoggerError),
}

/// Maps a level name to a filter. Unknown names fall back to `Info`.
pub fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Name of the log file for a run starting now.
pub fn log_file_name(app_name: &str) -> String {
    format!("{}_{}.log", app_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"))
}

/// Deletes every `<app_name>_*.log` in `log_dir` except the newest by name.
/// Returns the number of files removed.
pub fn rotate_logs(log_dir: &Path, app_name: &str) -> Result<usize, LoggerError> {
    let pattern = format!("{}/{}_*.log", log_dir.display(), app_name);
    let mut log_files: Vec<PathBuf> = glob(&pattern)?.filter_map(|entry| entry.ok()).collect();

    // Timestamped names sort chronologically; newest first.
    log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut removed = 0;
    for old_file in log_files.iter().skip(1) {
        match fs::remove_file(old_file) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Error deleting old log file {}: {}", old_file.display(), e),
        }
    }
    Ok(removed)
}

/// Builds the dispatcher without installing it, returning it together with
/// the path of the log file it writes.
pub fn build_dispatch(log_dir: &Path, log_level: &str, app_name: &str) -> Result<(fern::Dispatch, PathBuf), LoggerError> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    rotate_logs(log_dir, app_name)?;

    let log_path = log_dir.join(log_file_name(app_name));

    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?);

    Ok((dispatch, log_path))
}

/// Installs the process-wide logger. Can succeed only once per process.
pub fn setup_logging(log_dir: &Path, log_level: &str, app_name: &str) -> Result<PathBuf, LoggerError> {
    let (dispatch, log_path) = build_dispatch(log_dir, log_level, app_name)?;
    dispatch.apply()?;
    log::info!("Logging to {}", log_path.display());
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("TRACE"), log::LevelFilter::Trace);
        assert_eq!(parse_level("warn"), log::LevelFilter::Warn);
        assert_eq!(parse_level("fatal"), log::LevelFilter::Info);
    }

    #[test]
    fn rotation_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["2024-01-01_00-00-00", "2024-03-01_00-00-00", "2024-02-01_00-00-00"] {
            fs::write(dir.path().join(format!("exchange_{}.log", stamp)), b"x").unwrap();
        }
        fs::write(dir.path().join("other_2024-01-01_00-00-00.log"), b"x").unwrap();

        assert_eq!(rotate_logs(dir.path(), "exchange").unwrap(), 2);
        assert!(dir.path().join("exchange_2024-03-01_00-00-00.log").exists());
        assert!(!dir.path().join("exchange_2024-01-01_00-00-00.log").exists());
        assert!(dir.path().join("other_2024-01-01_00-00-00.log").exists());
    }

    #[test]
    fn build_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested/logs");
        let (_dispatch, path) = build_dispatch(&log_dir, "debug", "exchange").unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("exchange_"));
    }
}
