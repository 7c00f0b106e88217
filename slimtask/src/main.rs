//! imgmount - automounter helper for disk images.
//!
//! Runs without an async runtime: every tool is a single
//! fork/exec child waited for on the main thread.

mod cli;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use slimtask::mount::EX_USAGE;

use cli::{execute, Cli};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EX_USAGE } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    logging::init(cli.verbose);
    execute(&cli)
}
