pub mod account;
pub mod ops;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bitmark-flow")]
#[command(about = "Bitmark ownership transfer CLI", long_about = None)]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true, default_value = "bitmark-flow.toml")]
    pub config: PathBuf,

    /// Overrides the configured service endpoint
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Account management
    Account {
        #[command(subcommand)]
        cmd: account::AccountCommands,
    },
    /// Query transaction or bitmark status
    Status {
        #[command(subcommand)]
        cmd: ops::StatusCommands,
    },
    /// Wait until every id is final
    Wait {
        /// Ids are bitmarks instead of transactions
        #[arg(long)]
        bitmarks: bool,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Single-signature transfer
    Transfer {
        /// Owner's seed
        #[arg(long)]
        seed: String,
        #[arg(long)]
        bitmark: String,
        /// Receiver account number
        #[arg(long)]
        to: String,
    },
    /// Offer a bitmark to a receiver
    Offer {
        /// Owner's seed
        #[arg(long)]
        seed: String,
        #[arg(long)]
        bitmark: String,
        /// Receiver account number
        #[arg(long)]
        to: String,
        /// Extra info attached to the offer, as JSON
        #[arg(long)]
        extra: Option<String>,
    },
    /// List bitmarks by owner or pending receiver
    Bitmarks {
        #[arg(long)]
        owner: Option<String>,
        /// Only bitmarks offered to this account
        #[arg(long)]
        offer_to: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Open offers sent by and waiting for an account
    Offers {
        /// Account number
        account: String,
    },
    /// Answer a transfer offer
    Respond {
        #[command(subcommand)]
        cmd: ops::RespondCommands,
    },
}
