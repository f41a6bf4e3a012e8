//! In-process ledger.
//!
//! # Differences with the real service
//!
//! * Nothing settles on its own. Transactions stay `pending` until
//!   [`MemoryLedger::confirm`] or [`MemoryLedger::confirm_all`] is called.
//! * Signed request headers are not modelled; the requester is trusted to
//!   be who it claims.
//! * Failures queued with [`MemoryLedger::fail_next`] are returned by the
//!   next API calls, one per call, before any state is touched.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{LedgerApi, OfferReply, Requester};
use crate::account::AccountNumber;
use crate::error::{LedgerError, LedgerResult};
use crate::ids::{AssetId, BitmarkId, TxId};
use crate::record::{AssetRecord, CountersignedTransferRecord, IssueRecord, TransferOfferRecord, TransferRecord};
use crate::types::{
    AccountOffers, Asset, Bitmark, BitmarkOffer, BitmarkQuery, BitmarkStatus, OfferAction, Provenance, TransferOffer,
    TxInfo, TxStatus,
};

const CODE_INVALID_RECORD: i64 = 1001;
const CODE_NOT_FOUND: i64 = 1004;
const CODE_FORBIDDEN: i64 = 1003;
const CODE_HEAD_MISMATCH: i64 = 2013;

fn rejected(status: u16, code: i64, message: impl Into<String>) -> LedgerError {
    LedgerError::Service {
        status,
        code,
        message: message.into(),
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> LedgerError {
    rejected(404, CODE_NOT_FOUND, format!("{} {} not found", what, id))
}

#[derive(Default)]
struct LedgerState {
    assets: HashMap<AssetId, AssetRecord>,
    txs: HashMap<TxId, TxInfo>,
    bitmarks: HashMap<BitmarkId, Bitmark>,
    offers: HashMap<String, TransferOffer>,
    failures: VecDeque<LedgerError>,
    offer_seq: u64,
}

impl LedgerState {
    fn take_failure(&mut self) -> LedgerResult<()> {
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The bitmark whose current head is `link`.
    fn bitmark_at_head(&self, link: &TxId) -> LedgerResult<BitmarkId> {
        let tx = self.txs.get(link).ok_or_else(|| not_found("transaction", link))?;
        let bitmark_id = tx.bitmark_id.ok_or_else(|| not_found("bitmark for", link))?;
        let bitmark = self
            .bitmarks
            .get(&bitmark_id)
            .ok_or_else(|| not_found("bitmark", bitmark_id))?;
        if bitmark.head_id != *link {
            return Err(rejected(
                409,
                CODE_HEAD_MISMATCH,
                format!("link {} does not match head {}", link, bitmark.head_id),
            ));
        }
        Ok(bitmark_id)
    }

    fn current_owner(&self, bitmark_id: &BitmarkId) -> LedgerResult<AccountNumber> {
        self.bitmarks
            .get(bitmark_id)
            .map(|b| b.owner.clone())
            .ok_or_else(|| not_found("bitmark", bitmark_id))
    }

    /// Moves the bitmark to `receiver` with a new pending head.
    fn apply_transfer(&mut self, bitmark_id: BitmarkId, link: TxId, tx_id: TxId, receiver: AccountNumber) -> LedgerResult<()> {
        if self.txs.contains_key(&tx_id) {
            return Err(rejected(400, CODE_INVALID_RECORD, format!("transaction {} already exists", tx_id)));
        }
        let bitmark = self
            .bitmarks
            .get_mut(&bitmark_id)
            .ok_or_else(|| not_found("bitmark", bitmark_id))?;

        self.txs.insert(
            tx_id,
            TxInfo {
                id: tx_id,
                owner: receiver.clone(),
                status: TxStatus::Pending,
                previous_id: Some(link),
                bitmark_id: Some(bitmark_id),
                asset_id: Some(bitmark.asset_id),
                block_number: 0,
            },
        );
        bitmark.head_id = tx_id;
        bitmark.owner = receiver.clone();
        bitmark.offer = None;
        bitmark.head = "moving".to_string();
        bitmark.status = BitmarkStatus::Transferring;
        bitmark.provenance.insert(
            0,
            Provenance {
                tx_id,
                owner: receiver,
                status: TxStatus::Pending,
            },
        );
        Ok(())
    }

    fn settle_offer_status(&mut self, bitmark_id: &BitmarkId) {
        let head_confirmed = self
            .bitmarks
            .get(bitmark_id)
            .and_then(|b| self.txs.get(&b.head_id))
            .map(|tx| tx.status == TxStatus::Confirmed)
            .unwrap_or(false);
        if let Some(bitmark) = self.bitmarks.get_mut(bitmark_id) {
            bitmark.offer = None;
            bitmark.status = if head_confirmed {
                BitmarkStatus::Settled
            } else {
                BitmarkStatus::Pending
            };
        }
    }

    fn confirm(&mut self, id: &TxId) -> LedgerResult<()> {
        let (bitmark_id, block_number) = {
            let next_block = self.txs.values().map(|tx| tx.block_number).max().unwrap_or(0) + 1;
            let tx = self.txs.get_mut(id).ok_or_else(|| not_found("transaction", id))?;
            if tx.status == TxStatus::Confirmed {
                return Ok(());
            }
            tx.status = TxStatus::Confirmed;
            tx.block_number = next_block;
            (tx.bitmark_id, next_block)
        };

        if let Some(bitmark) = bitmark_id.and_then(|b| self.bitmarks.get_mut(&b)) {
            for entry in bitmark.provenance.iter_mut().filter(|p| p.tx_id == *id) {
                entry.status = TxStatus::Confirmed;
            }
            if bitmark.head_id == *id {
                bitmark.status = BitmarkStatus::Settled;
                bitmark.head = "settled".to_string();
                bitmark.block_number = block_number;
                bitmark.confirmed_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}

/// Ledger service emulated in memory.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a transaction confirmed; a confirmed head settles its bitmark.
    pub async fn confirm(&self, id: &TxId) -> LedgerResult<()> {
        self.state.lock().await.confirm(id)
    }

    pub async fn confirm_all(&self) {
        let mut state = self.state.lock().await;
        let mut pending: Vec<TxId> = state
            .txs
            .values()
            .filter(|tx| tx.status != TxStatus::Confirmed)
            .map(|tx| tx.id)
            .collect();
        pending.sort();
        for id in pending {
            // Ids were just read from the map
            let _ = state.confirm(&id);
        }
    }

    /// Queues an error for the next API call.
    pub async fn fail_next(&self, err: LedgerError) {
        self.state.lock().await.failures.push_back(err);
    }

    pub async fn open_offers(&self) -> Vec<TransferOffer> {
        self.state
            .lock()
            .await
            .offers
            .values()
            .filter(|o| o.open)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerApi for MemoryLedger {
    async fn issue(
        &self,
        asset: Option<&AssetRecord>,
        issues: &[IssueRecord],
    ) -> LedgerResult<Vec<BitmarkId>> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        if let Some(asset) = asset {
            asset
                .verify()
                .map_err(|e| rejected(400, CODE_INVALID_RECORD, e.to_string()))?;
        }

        // Validate the whole batch before touching state
        for issue in issues {
            issue
                .verify()
                .map_err(|e| rejected(400, CODE_INVALID_RECORD, e.to_string()))?;
            let known = state.assets.contains_key(&issue.asset_id)
                || asset.map(|a| a.id() == issue.asset_id).unwrap_or(false);
            if !known {
                return Err(not_found("asset", issue.asset_id));
            }
            if state.txs.contains_key(&issue.id()) {
                return Err(rejected(
                    400,
                    CODE_INVALID_RECORD,
                    format!("duplicate issue {}", issue.id()),
                ));
            }
        }

        if let Some(asset) = asset {
            state.assets.entry(asset.id()).or_insert_with(|| asset.clone());
        }

        let mut ids = Vec::with_capacity(issues.len());
        for issue in issues {
            let id = issue.id();
            let record = state
                .assets
                .get(&issue.asset_id)
                .cloned()
                .ok_or_else(|| not_found("asset", issue.asset_id))?;

            state.txs.insert(
                id,
                TxInfo {
                    id,
                    owner: issue.owner.clone(),
                    status: TxStatus::Pending,
                    previous_id: None,
                    bitmark_id: Some(id),
                    asset_id: Some(issue.asset_id),
                    block_number: 0,
                },
            );
            state.bitmarks.insert(
                id,
                Bitmark {
                    id,
                    head_id: id,
                    owner: issue.owner.clone(),
                    asset_id: issue.asset_id,
                    issuer: issue.owner.clone(),
                    head: "moving".to_string(),
                    status: BitmarkStatus::Issuing,
                    block_number: 0,
                    issued_at: Some(Utc::now()),
                    confirmed_at: None,
                    offer: None,
                    provenance: vec![Provenance {
                        tx_id: id,
                        owner: issue.owner.clone(),
                        status: TxStatus::Pending,
                    }],
                    asset: Some(Asset {
                        id: record.id(),
                        name: record.name.clone(),
                        fingerprint: record.fingerprint.clone(),
                        metadata: record.metadata_pairs().iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                        registrant: record.registrant.clone(),
                        status: "confirmed".to_string(),
                    }),
                },
            );
            ids.push(id);
        }

        debug!(count = ids.len(), "memory ledger accepted issues");
        Ok(ids)
    }

    async fn transfer(&self, record: &TransferRecord) -> LedgerResult<TxId> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let bitmark_id = state.bitmark_at_head(&record.link)?;
        let owner = state.current_owner(&bitmark_id)?;
        record
            .verify(&owner)
            .map_err(|e| rejected(400, CODE_INVALID_RECORD, e.to_string()))?;

        let tx_id = record.id();
        state.apply_transfer(bitmark_id, record.link, tx_id, record.owner.clone())?;
        debug!(tx = %tx_id, "memory ledger accepted transfer");
        Ok(tx_id)
    }

    async fn submit_countersigned_transfer(
        &self,
        record: &CountersignedTransferRecord,
    ) -> LedgerResult<TxId> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let bitmark_id = state.bitmark_at_head(&record.link)?;
        let owner = state.current_owner(&bitmark_id)?;
        record
            .verify(&owner)
            .map_err(|e| rejected(400, CODE_INVALID_RECORD, e.to_string()))?;

        let tx_id = record.id();
        state.apply_transfer(bitmark_id, record.link, tx_id, record.owner.clone())?;
        Ok(tx_id)
    }

    async fn submit_offer(
        &self,
        requester: Requester<'_>,
        record: &TransferOfferRecord,
        extra_info: Option<serde_json::Value>,
    ) -> LedgerResult<String> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let bitmark_id = state.bitmark_at_head(&record.link)?;
        let owner = state.current_owner(&bitmark_id)?;
        if requester.account_number() != &owner {
            return Err(rejected(
                409,
                CODE_HEAD_MISMATCH,
                format!("{} is not the owner of {}", requester.account_number().short(), bitmark_id),
            ));
        }
        record
            .verify(&owner)
            .map_err(|e| rejected(400, CODE_INVALID_RECORD, e.to_string()))?;

        state.offer_seq += 1;
        let offer_id = format!("offer-{}", state.offer_seq);
        state.offers.insert(
            offer_id.clone(),
            TransferOffer {
                id: offer_id.clone(),
                from: owner.clone(),
                to: record.owner.clone(),
                record: record.clone(),
                extra_info: extra_info.unwrap_or(serde_json::Value::Null),
                created_at: Some(Utc::now()),
                open: true,
            },
        );
        if let Some(bitmark) = state.bitmarks.get_mut(&bitmark_id) {
            bitmark.status = BitmarkStatus::Offering;
            bitmark.offer = Some(BitmarkOffer {
                id: offer_id.clone(),
                from: owner,
                to: record.owner.clone(),
            });
        }

        debug!(offer_id = %offer_id, "memory ledger stored offer");
        Ok(offer_id)
    }

    async fn respond_offer(
        &self,
        requester: Requester<'_>,
        offer_id: &str,
        reply: &OfferReply,
    ) -> LedgerResult<Option<TxId>> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let offer = state
            .offers
            .get(offer_id)
            .cloned()
            .ok_or_else(|| not_found("offer", offer_id))?;
        if !offer.open {
            return Err(rejected(400, CODE_INVALID_RECORD, format!("offer {} is closed", offer_id)));
        }
        if requester.account_number() != &offer.to {
            return Err(rejected(
                403,
                CODE_FORBIDDEN,
                format!("offer {} is not addressed to the requester", offer_id),
            ));
        }

        offer
            .record
            .with_countersignature(reply.countersignature)
            .verify(&offer.from)
            .map_err(|e| rejected(400, CODE_INVALID_RECORD, e.to_string()))?;

        let tx_id = match reply.action {
            OfferAction::Reject => {
                let bitmark_id = state.txs.get(&offer.record.link).and_then(|tx| tx.bitmark_id);
                if let Some(bitmark_id) = bitmark_id {
                    state.settle_offer_status(&bitmark_id);
                }
                None
            }
            OfferAction::Accept => {
                let bitmark_id = state.bitmark_at_head(&offer.record.link)?;
                let record = offer.record.with_countersignature(reply.countersignature);
                let tx_id = record.id();
                state.apply_transfer(bitmark_id, record.link, tx_id, record.owner.clone())?;
                Some(tx_id)
            }
        };

        if let Some(stored) = state.offers.get_mut(offer_id) {
            stored.open = false;
        }
        Ok(tx_id)
    }

    async fn get_offer(&self, offer_id: &str) -> LedgerResult<TransferOffer> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        state
            .offers
            .get(offer_id)
            .cloned()
            .ok_or_else(|| not_found("offer", offer_id))
    }

    async fn get_tx(&self, id: &TxId) -> LedgerResult<TxInfo> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        state.txs.get(id).cloned().ok_or_else(|| not_found("transaction", id))
    }

    async fn get_bitmark(&self, id: &BitmarkId) -> LedgerResult<Bitmark> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        state.bitmarks.get(id).cloned().ok_or_else(|| not_found("bitmark", id))
    }

    async fn query_bitmarks(&self, query: &BitmarkQuery) -> LedgerResult<Vec<Bitmark>> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let mut found: Vec<Bitmark> = state.bitmarks.values().filter(|b| query.matches(b)).cloned().collect();
        found.sort_by_key(|b| b.id);
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn list_offers(&self, account: &AccountNumber) -> LedgerResult<AccountOffers> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let mut open: Vec<&TransferOffer> = state.offers.values().filter(|o| o.open).collect();
        open.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let mut offers = AccountOffers::default();
        for offer in open {
            if &offer.from == account {
                offers.sent.push(offer.clone());
            }
            if &offer.to == account {
                offers.received.push(offer.clone());
            }
        }
        Ok(offers)
    }
}
