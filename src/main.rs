use clap::Parser;
use std::process::ExitCode;

use creator_points_lib::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    creator_points_lib::init_tracing();

    let cli = Cli::parse();
    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}
