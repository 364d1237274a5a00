pub mod config;
pub mod run;
pub mod score;

use std::fmt::Display;

/// Report a fatal error and exit non-zero.
pub fn fail(context: &str, err: impl Display) -> ! {
    log::error!("{context}: {err}");
    eprintln!("Error: {context}: {err}");
    std::process::exit(1);
}
