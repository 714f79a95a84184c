//! Logger initialization driven by environment variables.
//!
//! - `LOG_MODE`: "stdout" (default) or "file"
//! - `LOG_LEVEL`: trace | debug | info | warn | error (default "info")
//! - `LOG_FILE_PATH`: base path for file mode (default "logs/relay.log");
//!   the current UTC date is appended so files roll daily.

use chrono::Utc;
use eyre::{Context, Result};
use simplelog::{Config, LevelFilter, SimpleLogger, WriteLogger};
use std::{env, fs, path::Path};

fn level_from_env() -> LevelFilter {
    match env::var("LOG_LEVEL").as_deref().map(str::to_lowercase).as_deref() {
        Ok("trace") => LevelFilter::Trace,
        Ok("debug") => LevelFilter::Debug,
        Ok("warn") => LevelFilter::Warn,
        Ok("error") => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Appends the current UTC date before the `.log` extension so each day
/// gets its own file.
fn rolled_path(base: &str) -> String {
    let date = Utc::now().format("%Y-%m-%d");
    match base.strip_suffix(".log") {
        Some(stem) => format!("{stem}-{date}.log"),
        None => format!("{base}-{date}.log"),
    }
}

pub fn setup_logging() -> Result<()> {
    let level = level_from_env();
    let mode = env::var("LOG_MODE").unwrap_or_else(|_| "stdout".to_string());

    if mode.eq_ignore_ascii_case("file") {
        let base = env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/relay.log".to_string());
        let path = rolled_path(&base);
        if let Some(parent) = Path::new(&path).parent() {
            fs::create_dir_all(parent).wrap_err("failed to create log directory")?;
        }
        let file = fs::File::create(&path)
            .wrap_err_with(|| format!("unable to create log file {path}"))?;
        WriteLogger::init(level, Config::default(), file)?;
    } else {
        SimpleLogger::init(level, Config::default())?;
    }

    log::info!("logging configured (mode: {mode}, level: {level})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolled_path_inserts_date_before_extension() {
        let rolled = rolled_path("logs/relay.log");
        assert!(rolled.starts_with("logs/relay-"));
        assert!(rolled.ends_with(".log"));
        assert_ne!(rolled, "logs/relay.log");
    }

    #[test]
    fn rolled_path_appends_when_no_extension() {
        let rolled = rolled_path("logs/relay");
        assert!(rolled.starts_with("logs/relay-"));
        assert!(rolled.ends_with(".log"));
    }
}
