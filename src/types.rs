//! Ledger-side views returned by the service: transactions, bitmarks, offers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::account::AccountNumber;
use crate::ids::{AssetId, BitmarkId, TxId};
use crate::record::TransferOfferRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitmarkStatus {
    Issuing,
    Transferring,
    Offering,
    Pending,
    Settled,
    #[serde(other)]
    Unknown,
}

/// Statuses that can never change again once observed.
pub trait Settlement {
    fn is_final(&self) -> bool;
}

impl Settlement for TxStatus {
    fn is_final(&self) -> bool {
        matches!(self, TxStatus::Confirmed)
    }
}

impl Settlement for BitmarkStatus {
    fn is_final(&self) -> bool {
        matches!(self, BitmarkStatus::Settled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInfo {
    pub id: TxId,
    pub owner: AccountNumber,
    pub status: TxStatus,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub previous_id: Option<TxId>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub bitmark_id: Option<BitmarkId>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub asset_id: Option<AssetId>,
    #[serde(default)]
    pub block_number: u64,
}

/// The service sends `""` rather than `null` for absent links.
pub(crate) fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.is_empty() => s.parse().map(Some).map_err(de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub tx_id: TxId,
    pub owner: AccountNumber,
    pub status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub fingerprint: String,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,
    pub registrant: AccountNumber,
    #[serde(default)]
    pub status: String,
}

/// Snapshot of a bitmark as the ledger currently sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bitmark {
    pub id: BitmarkId,
    pub head_id: TxId,
    pub owner: AccountNumber,
    pub asset_id: AssetId,
    pub issuer: AccountNumber,
    /// `"moving"` while a transfer is in flight, `"settled"` otherwise
    #[serde(default)]
    pub head: String,
    pub status: BitmarkStatus,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<Asset>,
    /// Open transfer offer the bitmark is waiting on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<BitmarkOffer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitmarkOffer {
    pub id: String,
    pub from: AccountNumber,
    pub to: AccountNumber,
}

/// Filter for listing bitmarks. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitmarkQuery {
    pub owner: Option<AccountNumber>,
    pub offer_to: Option<AccountNumber>,
    pub limit: Option<usize>,
}

impl BitmarkQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owned_by(mut self, owner: AccountNumber) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Bitmarks with an open offer addressed to `receiver`.
    pub fn offer_to(mut self, receiver: AccountNumber) -> Self {
        self.offer_to = Some(receiver);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, bitmark: &Bitmark) -> bool {
        let owner_ok = self.owner.as_ref().map_or(true, |owner| &bitmark.owner == owner);
        let offer_ok = self.offer_to.as_ref().map_or(true, |receiver| {
            bitmark.offer.as_ref().map_or(false, |offer| &offer.to == receiver)
        });
        owner_ok && offer_ok
    }

    /// Query string pairs; assets are always loaded.
    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(owner) = &self.owner {
            pairs.push(("owner", owner.to_string()));
        }
        if let Some(receiver) = &self.offer_to {
            pairs.push(("offer_to", receiver.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs.push(("asset", "true".to_string()));
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferAction {
    Accept,
    Reject,
}

impl fmt::Display for OfferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferAction::Accept => write!(f, "accept"),
            OfferAction::Reject => write!(f, "reject"),
        }
    }
}

/// A pending two-phase transfer held by the service until the receiver replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOffer {
    pub id: String,
    pub from: AccountNumber,
    pub to: AccountNumber,
    pub record: TransferOfferRecord,
    #[serde(default)]
    pub extra_info: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_open")]
    pub open: bool,
}

fn default_open() -> bool {
    true
}

/// Open offers involving one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountOffers {
    /// Made by the account
    #[serde(default, rename = "from")]
    pub sent: Vec<TransferOffer>,
    /// Waiting for the account's answer
    #[serde(default, rename = "to")]
    pub received: Vec<TransferOffer>,
}
