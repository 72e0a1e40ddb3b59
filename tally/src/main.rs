//! Command line entry point of tally.
//!
//! The binary runs either side of the pipeline:
//!
//!  - `tally agent` polls runtime and system statistics and reports them to a server,
//!  - `tally server` accepts reports and stores them in memory, a file or PostgreSQL.
//!
//! Run `tally --help` or `tally <command> --help` for the available flags. Every flag can also be
//! set through the environment variable listed in the help text.

mod cli;
mod cliapp;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            tally_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
