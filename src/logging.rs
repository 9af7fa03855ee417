use std::path::Path;

use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "warn,steamgate=info";
const LOG_FILE_PREFIX: &str = "steamgate";
/// Today's file plus five rotated ones.
const LOG_FILES_KEPT: usize = 6;

/// Build the log filter: `RUST_LOG` if set, with this crate kept at `info`
/// or more verbose unless the directive names it explicitly.
pub fn env_filter(rust_log: Option<&str>, verbose: bool) -> EnvFilter {
    let own = if verbose { "steamgate=debug" } else { "steamgate=info" };
    match rust_log.map(str::trim).filter(|v| !v.is_empty()) {
        None if verbose => EnvFilter::new(format!("warn,{own}")),
        None => EnvFilter::new(DEFAULT_FILTER),
        Some(env) if env.contains("steamgate") => EnvFilter::new(env),
        Some(env) => EnvFilter::new(format!("{env},{own}")),
    }
}

/// `steamgate.<date>.log` in `dir`, rotated at midnight (UTC).
pub fn file_appender(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(LOG_FILES_KEPT)
        .build(dir)
}

/// Install the global subscriber: stderr always, plus a rotating file when
/// `log_dir` is given. A second call is a no-op.
pub fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Result<(), InitError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let file = log_dir.map(file_appender).transpose()?.map(|appender| {
        fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(appender)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter(rust_log.as_deref(), verbose))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        )
        .with(file)
        .try_init();
    Ok(())
}
