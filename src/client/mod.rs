//! Submission client.
//!
//! [`LedgerApi`] is the seam between the engine and the ledger service.
//! [`HttpLedger`] talks to the real service; [`MemoryLedger`] emulates it
//! in process for tests and dry runs.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpLedger;
pub use memory::MemoryLedger;

use crate::error::LedgerResult;
use crate::ids::{BitmarkId, Signature, TxId};
use crate::record::{AssetRecord, CountersignedTransferRecord, IssueRecord, TransferOfferRecord, TransferRecord};
use crate::signer::RecordSigner;
use crate::account::AccountNumber;
use crate::types::{AccountOffers, Bitmark, BitmarkQuery, OfferAction, TransferOffer, TxInfo};

/// Requester of a signed API call.
pub type Requester<'a> = &'a (dyn RecordSigner + Sync);

/// Receiver's answer to a transfer offer. The receiver countersigns the
/// offer whichever way it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferReply {
    pub action: OfferAction,
    pub countersignature: Signature,
}

impl OfferReply {
    pub fn accept(countersignature: Signature) -> Self {
        Self {
            action: OfferAction::Accept,
            countersignature,
        }
    }

    pub fn reject(countersignature: Signature) -> Self {
        Self {
            action: OfferAction::Reject,
            countersignature,
        }
    }
}

#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Submits issues, optionally registering their asset in the same call.
    /// Returns the new bitmark ids in submission order.
    async fn issue(
        &self,
        asset: Option<&AssetRecord>,
        issues: &[IssueRecord],
    ) -> LedgerResult<Vec<BitmarkId>>;

    /// Single-signature transfer.
    async fn transfer(&self, record: &TransferRecord) -> LedgerResult<TxId>;

    /// Countersigned transfer submitted directly, without a stored offer.
    async fn submit_countersigned_transfer(
        &self,
        record: &CountersignedTransferRecord,
    ) -> LedgerResult<TxId>;

    /// Stores a transfer offer for the receiver; returns the offer id.
    async fn submit_offer(
        &self,
        requester: Requester<'_>,
        record: &TransferOfferRecord,
        extra_info: Option<serde_json::Value>,
    ) -> LedgerResult<String>;

    /// Accepts or rejects a stored offer. An accepted offer yields the
    /// transaction id, a rejected one yields nothing.
    async fn respond_offer(
        &self,
        requester: Requester<'_>,
        offer_id: &str,
        reply: &OfferReply,
    ) -> LedgerResult<Option<TxId>>;

    async fn get_offer(&self, offer_id: &str) -> LedgerResult<TransferOffer>;

    async fn get_tx(&self, id: &TxId) -> LedgerResult<TxInfo>;

    async fn get_bitmark(&self, id: &BitmarkId) -> LedgerResult<Bitmark>;

    /// Bitmarks matching `query`, with their assets loaded.
    async fn query_bitmarks(&self, query: &BitmarkQuery) -> LedgerResult<Vec<Bitmark>>;

    /// Open offers sent by or addressed to `account`.
    async fn list_offers(&self, account: &AccountNumber) -> LedgerResult<AccountOffers>;
}
