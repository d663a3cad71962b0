use clap::Parser;
use std::process::ExitCode;

use tierup::cli::{self, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // clap exits with status 2 on usage errors
    let args = Cli::parse();

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.user_message());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
