//! galframe - Command-line tool for building visual-novel frame caches

use std::process::ExitCode;

use galframe::cli;

fn main() -> ExitCode {
    cli::run()
}
