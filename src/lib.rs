pub mod cli;
pub mod connect;
pub mod error;
pub mod logging;

use std::process::ExitCode;

use clap::Parser;

pub use connect::{BaseClient, ClientConfig, HighLevelClient, HttpBaseClient};
pub use error::AppError;

/// Entry point of the `kc-cli` binary.
pub fn run() -> ExitCode {
    // .env first, so env-backed flags see it.
    let _ = dotenvy::dotenv();
    let cli = cli::Cli::parse();

    logging::init(cli.verbose, cli.json_log);
    tracing::debug!("Starting kc-cli v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            cli::output::print_error(&AppError::Io(e), cli.json_log);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(&cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(kind = e.kind(), "Command failed");
            cli::output::print_error(&e, cli.json_log);
            ExitCode::FAILURE
        }
    }
}
