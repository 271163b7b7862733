// src/bin/vx.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use vx::{
    cli::{Cli, dispatcher},
    core::task_manager::RenderSummary,
    operations::OperationError,
    t,
};

/// The main entry point of the `vx` application.
/// It sets up logging, parses arguments, runs the selected operation
/// and performs centralized error handling.
fn main() {
    env_logger::init();

    match run_cli(Cli::parse()) {
        Ok(summary) if summary.failed() => {
            eprintln!("\n{}: {}", "Error".red().bold(), t!("main.error.failed"));
            std::process::exit(1);
        }
        Ok(_) => {}
        Err(e) => {
            // A declined confirmation or Ctrl+C at a prompt is not a failure.
            if matches!(e.downcast_ref::<OperationError>(), Some(OperationError::Cancelled)) {
                println!("{} {}", "ℹ".blue(), t!("main.info.cancelled"));
                return;
            }

            eprintln!("\n{}: {}", "Error".red().bold(), dispatcher::error_report(&e));
            std::process::exit(1);
        }
    }
}

/// Task pipelines hold `Rc` trees, so everything runs on one thread.
fn run_cli(cli: Cli) -> Result<RenderSummary> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context(t!("main.error.runtime"))?;
    runtime.block_on(dispatcher::dispatch(cli))
}
