//! Log file setup.
//!
//! All diagnostics go to a rotating log file in the resource directory;
//! nothing is printed to stdout on success. Verbose mode widens the filter
//! to debug records.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Error;

/// Initialize logging to the given file.
///
/// The returned guard must be held for the lifetime of the process so
/// buffered records are flushed on exit.
pub fn init(log_file: &Path, verbose: bool, to_stdout: bool) -> Result<WorkerGuard, Error> {
    if let Some(dir) = log_file.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|err| Error::Generic(format!("failed to create log file directory: {err}")))?;
    }

    let filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let (writer, guard) = if to_stdout {
        tracing_appender::non_blocking(std::io::stdout())
    } else {
        let directory = log_file.parent().unwrap_or(Path::new("."));
        let filename = log_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "wakatime.log".to_string());

        // daily rotation bounds disk usage across long-lived installs
        let appender = tracing_appender::rolling::daily(directory, filename);
        tracing_appender::non_blocking(appender)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
        .init();

    Ok(guard)
}
