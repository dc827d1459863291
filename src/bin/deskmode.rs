//! deskmode binary entry point
//!
//! Parses arguments, sets up logging, and runs the command on a blocking
//! thread while watching for Ctrl-C.

use clap::Parser;
use color_eyre::eyre::Result;
use deskmode::{cli::Args, commands, logging};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let guard = logging::init(args.verbose);

    // Device handles are single-threaded; everything is built inside the task
    let command = args.command;
    let task = tokio::task::spawn_blocking(move || commands::run(&command));

    let code = tokio::select! {
        joined = task => match joined {
            Ok(Ok(true)) => 0,
            Ok(Ok(false)) => 1,
            Ok(Err(e)) => {
                error!("{:#}", e);
                1
            }
            Err(e) => {
                error!("Command task failed: {}", e);
                1
            }
        },
        _ = signal::ctrl_c() => {
            info!("Operation cancelled by user");
            130
        }
    };

    // exit() skips destructors; flush the file log first
    drop(guard);
    std::process::exit(code);
}
