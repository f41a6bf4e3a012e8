use clap::Subcommand;

use crate::account::{Account, Network};
use crate::error::LedgerResult;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    New {
        /// Defaults to the configured network
        #[arg(long)]
        network: Option<Network>,
    },
    /// Show the account behind a seed
    Show {
        #[arg(long)]
        seed: String,
    },
}

pub fn handle_account_command(cmd: AccountCommands, default_network: Network) -> LedgerResult<()> {
    match cmd {
        AccountCommands::New { network } => {
            let account = Account::create(network.unwrap_or(default_network));
            print_account(&account);
            println!("Seed:           {}", account.export_seed());
            println!("KEEP THE SEED SAFE!");
        }
        AccountCommands::Show { seed } => {
            let account = Account::from_seed(&seed)?;
            print_account(&account);
        }
    }
    Ok(())
}

fn print_account(account: &Account) {
    println!("Network:        {}", account.network());
    println!("Account number: {}", account.account_number());
    println!("Encryption key: {}", hex::encode(account.encryption_public_key()));
}
