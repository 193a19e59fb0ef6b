//! media-bundle CLI - download URLs into a single file or ZIP archive.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::process::ExitCode;

use media_bundle::cli::{self, Command, USAGE};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match cli::parse_args(env::args().skip(1)) {
        Ok(Command::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Ok(Command::Download(args)) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match cli::run(args).await {
        Ok(result) if result.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
