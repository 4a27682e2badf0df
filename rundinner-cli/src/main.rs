//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use rundinner_cli::CliError;

fn main() {
    match rundinner_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("rundinner: {err}");
            std::process::exit(1);
        }
    }
}
