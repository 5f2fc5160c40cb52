//! codetick - CLI entry point.

use clap::Parser;
use tracing::{debug, error};

use codetick::cli::{Cli, Operation};
use codetick::commands;
use codetick::config::{self, Settings};
use codetick::error::{Error, ERR_GENERIC, SUCCESS};

fn main() {
    let cli = Cli::parse();

    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let log_file = match cli.log_file.clone().map(Ok).unwrap_or_else(config::log_file_path) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("failed to resolve log file path: {err}");
            return ERR_GENERIC;
        }
    };

    let _log_guard = match codetick::logfile::init(&log_file, cli.verbose, cli.log_to_stdout) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to setup logging: {err}");
            return ERR_GENERIC;
        }
    };

    // unknown panics exit generic after logging a stack trace
    let outcome = std::panic::catch_unwind(|| dispatch(cli));

    match outcome {
        Ok(Ok(())) => SUCCESS,
        Ok(Err(err)) => {
            if err.should_log_error() {
                error!("{err}");
            } else {
                debug!("{err}");
            }

            err.exit_code()
        }
        Err(panic) => {
            let message = panic_message(&panic);
            error!(
                "panicked: {message}. Stack: {}",
                std::backtrace::Backtrace::force_capture()
            );

            ERR_GENERIC
        }
    }
}

fn dispatch(cli: &Cli) -> Result<(), Error> {
    let settings = match Settings::resolve(cli) {
        Ok(settings) => settings,
        Err(err @ Error::ConfigFileParse(_)) => {
            // still queue the heartbeat so a broken config loses nothing
            error!("failed to parse config files: {err}");

            if cli.entity.is_some() {
                if let Ok(queue_path) = Settings::default().queue_path() {
                    let _ = commands::offline::save_heartbeats(
                        cli,
                        &Settings::default(),
                        None,
                        &queue_path,
                    );
                }
            }

            return Err(err);
        }
        Err(err) => return Err(err),
    };

    match cli.operation() {
        Operation::Heartbeat => {
            debug!("command: heartbeat");
            commands::heartbeat::run(cli, &settings)?;

            // piggyback a queue sync after a successful send
            commands::sync::run_with_rate_limiting(&settings)
        }
        Operation::SyncOfflineActivity => {
            debug!("command: sync-offline-activity");
            commands::sync::run(&settings)
        }
        Operation::OfflineCount => {
            debug!("command: offline-count");
            commands::offline::count(&settings)
        }
        Operation::PrintOfflineHeartbeats => {
            debug!("command: print-offline-heartbeats");
            commands::offline::print(&settings, cli.print_offline_heartbeats)
        }
        Operation::None => Err(Error::Generic(
            "one of the following parameters has to be provided: --entity, \
             --sync-offline-activity, --offline-count, --print-offline-heartbeats"
                .to_string(),
        )),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
