//! Stylebook - command-line tool building stylesheets and their styleguide

use std::process::ExitCode;

use stylebook::cli;

fn main() -> ExitCode {
    cli::run()
}
