use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cinemerge_cli::cli_args::Cli;
use cinemerge_cli::{EXIT_FATAL, exit_code, run};
use cinemerge_core::init_logging;
use clap::Parser;
use tracing::{Instrument, Span, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = match init_logging(&cli.global.run_log()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("Failed to initialize logging: {err}");
            None
        }
    };
    let span = log
        .as_ref()
        .map_or_else(Span::none, |handle| handle.run_span(cli.command.name()));

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current item");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let code = match run(cli, stop).instrument(span).await {
        Ok(summary) => {
            eprintln!("{summary}");
            exit_code(&summary)
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            EXIT_FATAL
        }
    };
    drop(log);
    ExitCode::from(code as u8)
}
