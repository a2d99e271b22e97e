mod chunk_joiner;
mod chunkserver;
mod cli;
mod command_runner;
mod config;
mod file_chunker;
mod master;

use std::{process::ExitCode, sync::Arc};

use chunkserver::service::GrpcChunkserverService;
use clap::Parser;
use cli::{Cli, EXIT_OK, EXIT_USAGE};
use command_runner::CommandRunner;
use config::CONFIG;
use master::service::GrpcMasterService;
use utilities::logger::{info, init_logger};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // help and version are not usage errors
            return ExitCode::from(if e.use_stderr() { EXIT_USAGE } else { EXIT_OK });
        }
    };
    let _guard = init_logger(
        "Client",
        &CONFIG.client_id,
        &CONFIG.log_level,
        &CONFIG.log_base,
        CONFIG.apm_endpoint.as_deref(),
    );
    let master_addrs = cli.master.unwrap_or_else(|| CONFIG.master_addrs.clone());
    info!(%master_addrs, command = ?cli.command, "starting the Client");

    let command_runner = CommandRunner::new(
        Arc::new(GrpcMasterService::new(&master_addrs, CONFIG.rpc_timeout())),
        Arc::new(GrpcChunkserverService::new(CONFIG.rpc_timeout())),
        CONFIG.write_retries,
        CONFIG.write_backoff(),
    );
    match command_runner.run(cli.command).await {
        Ok(message) => {
            if !message.is_empty() {
                println!("{message}");
            }
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            info!(error = %e, "command failed");
            eprintln!("sfs: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
