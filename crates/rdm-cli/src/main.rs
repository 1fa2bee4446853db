use rdm_core::logging;

mod cli;

use clap::Parser;

use crate::cli::{usage_exit_code, Cli};

fn main() {
    // File logging under the XDG state dir, stderr when that is unavailable.
    logging::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = usage_exit_code(&err);
            if let Err(e) = err.print() {
                tracing::debug!(error = %e, "could not print usage");
            }
            std::process::exit(code);
        }
    };
    if let Err(err) = cli.run() {
        eprintln!("rdm error: {:#}", err);
        std::process::exit(1);
    }
}
