//! botship - Entry Point
//!
//! Deploys a chat bot to a remote host over SSH and manages its secrets,
//! backups and deployment history.

use std::env;
use std::process::ExitCode;

use colored::Colorize;

use botship::app::options::{AppOptions, USAGE};
use botship::app::run::run;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let options = match AppOptions::from_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            eprint!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
