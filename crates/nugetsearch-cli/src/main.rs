//! Command line tool to load NuGet package icons through the icon manager.

#![warn(missing_debug_implementations, clippy::all)]

mod cli;
mod fetch;
mod logging;
mod output;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
