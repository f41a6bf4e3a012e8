use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;
use tokio::time::Instant;

use crate::account::{Account, AccountNumber};
use crate::client::LedgerApi;
use crate::engine::TransferEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::ids::{BitmarkId, TxId};
use crate::types::BitmarkQuery;

#[derive(Subcommand)]
pub enum StatusCommands {
    /// Transaction status
    Tx { id: String },
    /// Bitmark status, with asset and provenance
    Bitmark { id: String },
}

#[derive(Subcommand)]
pub enum RespondCommands {
    /// Countersign and accept an offer
    Accept {
        /// Receiver's seed
        #[arg(long)]
        seed: String,
        #[arg(long)]
        offer: String,
    },
    /// Decline an offer
    Reject {
        /// Receiver's seed
        #[arg(long)]
        seed: String,
        #[arg(long)]
        offer: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> LedgerResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn handle_status_command<L: LedgerApi>(engine: &TransferEngine<L>, cmd: StatusCommands) -> LedgerResult<()> {
    match cmd {
        StatusCommands::Tx { id } => {
            let tx = engine.ledger().get_tx(&TxId::from_hex(&id)?).await?;
            print_json(&tx)
        }
        StatusCommands::Bitmark { id } => {
            let bitmark = engine.bitmark(&BitmarkId::from_hex(&id)?).await?;
            print_json(&bitmark)
        }
    }
}

pub async fn handle_wait_command<L: LedgerApi>(
    engine: &TransferEngine<L>,
    ids: &[String],
    bitmarks: bool,
    timeout_secs: u64,
) -> LedgerResult<()> {
    let ids = ids
        .iter()
        .map(|id| TxId::from_hex(id))
        .collect::<LedgerResult<Vec<_>>>()?;
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);

    println!("Waiting for {} id(s)...", ids.len());
    if bitmarks {
        engine.bitmark_tracker().await_all_until(&ids, deadline).await?;
    } else {
        engine.tracker().await_all_until(&ids, deadline).await?;
    }
    println!("All confirmed.");
    Ok(())
}

pub async fn handle_transfer_command<L: LedgerApi>(
    engine: &TransferEngine<L>,
    seed: &str,
    bitmark: &str,
    to: &str,
) -> LedgerResult<()> {
    let owner = Account::from_seed(seed)?;
    let receiver = AccountNumber::parse(to)?;
    let bitmark_id = BitmarkId::from_hex(bitmark)?;

    println!("Submitting transfer...");
    let tx_id = engine.transfer(&owner, &bitmark_id, &receiver).await?;
    println!("Success! Tx Id: {}", tx_id);
    Ok(())
}

pub async fn handle_offer_command<L: LedgerApi>(
    engine: &TransferEngine<L>,
    seed: &str,
    bitmark: &str,
    to: &str,
    extra: Option<&str>,
) -> LedgerResult<()> {
    let sender = Account::from_seed(seed)?;
    let receiver = AccountNumber::parse(to)?;
    let bitmark_id = BitmarkId::from_hex(bitmark)?;
    let extra_info = extra
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| LedgerError::Validation(format!("extra info is not JSON: {}", e)))?;

    println!("Submitting offer...");
    let offer = engine.offer(&sender, &bitmark_id, &receiver, extra_info).await?;
    println!("Success! Offer Id: {}", offer.offer_id);
    Ok(())
}

pub async fn handle_bitmarks_command<L: LedgerApi>(
    engine: &TransferEngine<L>,
    owner: Option<&str>,
    offer_to: Option<&str>,
    limit: Option<usize>,
) -> LedgerResult<()> {
    let mut query = BitmarkQuery::new();
    if let Some(owner) = owner {
        query = query.owned_by(AccountNumber::parse(owner)?);
    }
    if let Some(receiver) = offer_to {
        query = query.offer_to(AccountNumber::parse(receiver)?);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    print_json(&engine.bitmarks(&query).await?)
}

pub async fn handle_offers_command<L: LedgerApi>(engine: &TransferEngine<L>, account: &str) -> LedgerResult<()> {
    let account = AccountNumber::parse(account)?;
    print_json(&engine.offers(&account).await?)
}

pub async fn handle_respond_command<L: LedgerApi>(engine: &TransferEngine<L>, cmd: RespondCommands) -> LedgerResult<()> {
    match cmd {
        RespondCommands::Accept { seed, offer } => {
            let receiver = Account::from_seed(&seed)?;
            let tx_id = engine.accept(&receiver, &offer).await?;
            println!("Offer accepted. Tx Id: {}", tx_id);
        }
        RespondCommands::Reject { seed, offer } => {
            let receiver = Account::from_seed(&seed)?;
            engine.reject(&receiver, &offer).await?;
            println!("Offer {} rejected.", offer);
        }
    }
    Ok(())
}
