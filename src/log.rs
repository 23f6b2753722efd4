//! Logging for model runs.
//!
//! Messages go to the terminal (coloured if it supports it) and, for the `run` command, to two log
//! files in the output directory: one for the progress of the run and one for warnings and errors.
//! The log level is taken from the `HUBPLAN_LOG_LEVEL` environment variable, then `settings.toml`.
use anyhow::{Context, Result};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{LevelFilter, Record};
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The log level used when neither the environment nor the settings file specify one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The environment variable which overrides the log level
const LOG_LEVEL_ENV_VAR: &str = "HUBPLAN_LOG_LEVEL";

/// Progress of a run: everything less severe than a warning
const LOG_INFO_FILE_NAME: &str = "hubplan_info.log";

/// Warnings and errors
const LOG_ERROR_FILE_NAME: &str = "hubplan_error.log";

/// Prefix stripped from log targets so that messages name the module, e.g. `aggregation`
const TARGET_PREFIX: &str = "hubplan::";

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Initialise the program logger.
///
/// Valid log levels are `off`, `error`, `warn`, `info`, `debug` and `trace` (in any case). Debug
/// level also turns on the solver's own console output.
///
/// # Arguments
///
/// * `log_level_from_settings` - The log level specified in `settings.toml`, if any
/// * `log_dir` - Folder in which to create log files. If `None`, only the terminal is used.
pub fn init(log_level_from_settings: Option<&str>, log_dir: Option<&Path>) -> Result<()> {
    let level = resolve_log_level(log_level_from_settings)?;

    let mut dispatch = terminal_dispatch(level);
    if let Some(log_dir) = log_dir {
        dispatch = dispatch.chain(file_dispatch(log_dir, level)?);
    }
    dispatch.apply().context("Logger already initialised")?;

    let _ = LOGGER_INIT.set(());

    Ok(())
}

/// Pick the log level from the environment, falling back to settings and then the default
fn resolve_log_level(log_level_from_settings: Option<&str>) -> Result<LevelFilter> {
    let level = env::var(LOG_LEVEL_ENV_VAR).unwrap_or_else(|_| {
        log_level_from_settings
            .unwrap_or(DEFAULT_LOG_LEVEL)
            .to_string()
    });

    parse_log_level(&level)
}

fn parse_log_level(level: &str) -> Result<LevelFilter> {
    level
        .trim()
        .parse()
        .with_context(|| format!("Unknown log level: {level}"))
}

/// Informational messages go to stdout and warnings and errors to stderr
fn terminal_dispatch(level: LevelFilter) -> Dispatch {
    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    let colour_stdout = std::io::stdout().is_terminal();
    let colour_stderr = std::io::stderr().is_terminal();

    Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .format(move |out, message, record| {
                    format_terminal(out, message, record, colour_stdout.then_some(&colours));
                })
                .level(level)
                .chain(std::io::stdout()),
        )
        .chain(
            Dispatch::new()
                .format(move |out, message, record| {
                    format_terminal(out, message, record, colour_stderr.then_some(&colours));
                })
                .level(level.min(LevelFilter::Warn))
                .chain(std::io::stderr()),
        )
}

/// The info log records at least info level, whatever the terminal shows
fn file_dispatch(log_dir: &Path, level: LevelFilter) -> Result<Dispatch> {
    let create = |file_name: &str| {
        let path = log_dir.join(file_name);
        File::create(&path).with_context(|| format!("Could not create {}", path.display()))
    };

    Ok(Dispatch::new()
        .chain(
            Dispatch::new()
                .filter(|metadata| metadata.level() > LevelFilter::Warn)
                .format(format_file)
                .level(level.max(LevelFilter::Info))
                .chain(create(LOG_INFO_FILE_NAME)?),
        )
        .chain(
            Dispatch::new()
                .format(format_file)
                .level(LevelFilter::Warn)
                .chain(create(LOG_ERROR_FILE_NAME)?),
        ))
}

/// The module a message came from, without the crate name
fn short_target<'a>(record: &Record<'a>) -> &'a str {
    let target = record.target();
    target.strip_prefix(TARGET_PREFIX).unwrap_or(target)
}

fn write_line<T: Display, L: Display>(
    out: FormatCallback,
    time: T,
    level: L,
    target: &str,
    message: &Arguments,
) {
    out.finish(format_args!("[{time} {level} {target}] {message}"));
}

fn format_terminal(
    out: FormatCallback,
    message: &Arguments,
    record: &Record,
    colours: Option<&ColoredLevelConfig>,
) {
    let time = Local::now().format("%H:%M:%S");
    let target = short_target(record);
    match colours {
        Some(colours) => write_line(out, time, colours.color(record.level()), target, message),
        None => write_line(out, time, record.level(), target, message),
    }
}

/// Log file lines carry the full date
fn format_file(out: FormatCallback, message: &Arguments, record: &Record) {
    let time = Local::now().format("%Y-%m-%d %H:%M:%S");
    write_line(out, time, record.level(), short_target(record), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("off", LevelFilter::Off)]
    #[case("warn", LevelFilter::Warn)]
    #[case("DEBUG", LevelFilter::Debug)]
    #[case(" trace ", LevelFilter::Trace)]
    fn test_parse_log_level(#[case] level: &str, #[case] expected: LevelFilter) {
        assert_eq!(parse_log_level(level).unwrap(), expected);
    }

    #[test]
    fn test_parse_log_level_unknown() {
        assert_eq!(
            parse_log_level("loud").unwrap_err().to_string(),
            "Unknown log level: loud"
        );
    }

    #[test]
    fn test_file_dispatch_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        file_dispatch(dir.path(), LevelFilter::Debug).unwrap();
        assert!(dir.path().join(LOG_INFO_FILE_NAME).is_file());
        assert!(dir.path().join(LOG_ERROR_FILE_NAME).is_file());
    }
}
