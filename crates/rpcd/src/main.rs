//! Entry point for the rpcd daemon binary.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match rpcd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            writeln!(io::stderr().lock(), "{error}").ok();
            ExitCode::FAILURE
        }
    }
}
