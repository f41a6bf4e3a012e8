use std::process::ExitCode;
use std::sync::Arc;

use bitmark_flow::cli::{self, Cli, Commands};
use bitmark_flow::client::HttpLedger;
use bitmark_flow::config::EngineConfig;
use bitmark_flow::engine::TransferEngine;
use bitmark_flow::error::LedgerResult;
use clap::Parser;
use tracing::{error, info_span};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = EngineConfig::load_or_default(&cli.config);
    if let Some(endpoint) = cli.endpoint.clone() {
        config.api_endpoint = Some(endpoint);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &EngineConfig) -> LedgerResult<()> {
    if let Commands::Account { cmd } = command {
        return cli::account::handle_account_command(cmd, config.network);
    }

    let ledger = HttpLedger::new(config.endpoint(), config.request_timeout())?;
    let span = info_span!("engine", network = %config.network, endpoint = %config.endpoint());
    let engine = TransferEngine::from_config(Arc::new(ledger), config).with_span(span);

    match command {
        Commands::Account { .. } => Ok(()),
        Commands::Status { cmd } => cli::ops::handle_status_command(&engine, cmd).await,
        Commands::Wait {
            bitmarks,
            timeout_secs,
            ids,
        } => cli::ops::handle_wait_command(&engine, &ids, bitmarks, timeout_secs).await,
        Commands::Transfer { seed, bitmark, to } => {
            cli::ops::handle_transfer_command(&engine, &seed, &bitmark, &to).await
        }
        Commands::Offer {
            seed,
            bitmark,
            to,
            extra,
        } => cli::ops::handle_offer_command(&engine, &seed, &bitmark, &to, extra.as_deref()).await,
        Commands::Bitmarks { owner, offer_to, limit } => {
            cli::ops::handle_bitmarks_command(&engine, owner.as_deref(), offer_to.as_deref(), limit).await
        }
        Commands::Offers { account } => cli::ops::handle_offers_command(&engine, &account).await,
        Commands::Respond { cmd } => cli::ops::handle_respond_command(&engine, cmd).await,
    }
}
