//! Suspensor.
//!
//! A command line driver for suspending route transitions. It renders a small demo app
//! whose routes read simulated quote and delay data, navigates it through a list of
//! locations and prints every frame that would have been on screen.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod demo;
mod logging;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
