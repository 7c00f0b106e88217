//! CLI command execution.

use std::process::ExitCode;

use slimtask::mount::{MountConfig, Mounter, EX_OSERR};
use tracing::error;

use super::args::Cli;

/// Run the command described by `cli` and map the outcome to an exit code.
pub fn execute(cli: &Cli) -> ExitCode {
    let config = match MountConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::from(EX_OSERR);
        }
    };
    let mounter = Mounter::new(config);

    let Some(key) = cli.key.as_deref() else {
        for name in mounter.list() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    };

    match mounter.mount(key) {
        Ok(entry) => {
            println!("{entry}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(key, "{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
