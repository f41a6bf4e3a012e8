//! Transfer engine: the public face of the crate.
//!
//! Composes the record builder, a ledger client, the retry policy and the
//! confirmation tracker, and keeps a local [`OwnershipState`] per bitmark
//! it has touched.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn, Span};

use crate::account::{Account, AccountNumber, Network};
use crate::client::{LedgerApi, OfferReply};
use crate::config::EngineConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::ids::{AssetId, BitmarkId, TxId};
use crate::ownership::{OwnershipEvent, OwnershipState};
use crate::record::{CountersignedTransferRecord, Metadata, RecordBuilder, TransferOfferRecord};
use crate::retry::RetryPolicy;
use crate::tracker::{Bitmarks, ConfirmationTracker, Transactions, DEFAULT_MAX_CONCURRENCY, DEFAULT_POLL_INTERVAL};
use crate::types::{AccountOffers, Bitmark, BitmarkQuery, TransferOffer};

/// An offer accepted by the service, waiting for the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOffer {
    pub offer_id: String,
    pub bitmark_id: BitmarkId,
    pub record: TransferOfferRecord,
}

pub struct TransferEngine<L> {
    ledger: Arc<L>,
    builder: RecordBuilder,
    retry: RetryPolicy,
    poll_interval: Duration,
    max_concurrency: usize,
    span: Span,
    models: Mutex<HashMap<BitmarkId, OwnershipState>>,
}

impl<L: LedgerApi> TransferEngine<L> {
    pub fn new(ledger: Arc<L>, network: Network) -> Self {
        Self {
            ledger,
            builder: RecordBuilder::new(network),
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            span: Span::none(),
            models: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(ledger: Arc<L>, config: &EngineConfig) -> Self {
        Self::new(ledger, config.network)
            .with_retry(config.retry.policy())
            .with_polling(config.tracker.poll_interval(), config.tracker.max_concurrency)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry.with_span(self.span.clone());
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_concurrency: usize) -> Self {
        self.poll_interval = poll_interval;
        self.max_concurrency = max_concurrency;
        self
    }

    /// Events of the engine, its retry policy and its trackers go to `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.retry = self.retry.with_span(span.clone());
        self.span = span;
        self
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn builder(&self) -> &RecordBuilder {
        &self.builder
    }

    /// Local view of a bitmark's ownership, if this engine has seen it.
    pub async fn ownership(&self, bitmark_id: &BitmarkId) -> Option<OwnershipState> {
        self.models.lock().await.get(bitmark_id).cloned()
    }

    async fn track(&self, bitmark_id: BitmarkId, state: OwnershipState) {
        self.models.lock().await.insert(bitmark_id, state);
    }

    async fn record_event(&self, bitmark_id: &BitmarkId, event: OwnershipEvent) {
        let mut models = self.models.lock().await;
        if let Some(state) = models.get_mut(bitmark_id) {
            if let Err(err) = state.apply(event) {
                warn!(parent: &self.span, bitmark = %bitmark_id, error = %err, "local ownership out of step");
            }
        }
    }

    async fn retried<T, F, Fut>(&self, operation: &str, op: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        self.retry.run(operation, op).await
    }

    /// Registers an asset and issues `quantity` bitmarks of it to the registrant.
    pub async fn register_and_issue(
        &self,
        registrant: &Account,
        name: &str,
        fingerprint: &str,
        metadata: &Metadata,
        quantity: usize,
    ) -> LedgerResult<Vec<BitmarkId>> {
        let asset = self.builder.build_asset(name, fingerprint, metadata, registrant)?;
        let issues = self.build_issues(&asset.id(), registrant, quantity)?;

        let ledger = &self.ledger;
        let (asset_ref, issues_ref) = (&asset, &issues);
        let ids = self
            .retried("issue", move || async move { ledger.issue(Some(asset_ref), issues_ref).await })
            .await?;

        self.after_issue(registrant, &ids).await;
        info!(parent: &self.span, asset = %asset.id(), count = ids.len(), "asset registered and issued");
        Ok(ids)
    }

    /// Issues more bitmarks of an already registered asset.
    pub async fn issue(&self, issuer: &Account, asset_id: &AssetId, quantity: usize) -> LedgerResult<Vec<BitmarkId>> {
        let issues = self.build_issues(asset_id, issuer, quantity)?;

        let ledger = &self.ledger;
        let issues_ref = &issues;
        let ids = self
            .retried("issue", move || async move { ledger.issue(None, issues_ref).await })
            .await?;

        self.after_issue(issuer, &ids).await;
        info!(parent: &self.span, asset = %asset_id, count = ids.len(), "bitmarks issued");
        Ok(ids)
    }

    fn build_issues(
        &self,
        asset_id: &AssetId,
        issuer: &Account,
        quantity: usize,
    ) -> LedgerResult<Vec<crate::record::IssueRecord>> {
        if quantity == 0 {
            return Err(LedgerError::Validation("quantity must be at least 1".to_string()));
        }
        let asset_index = asset_id.to_hex();
        (0..quantity)
            .map(|_| self.builder.build_issue(&asset_index, issuer, None))
            .collect()
    }

    async fn after_issue(&self, issuer: &Account, ids: &[BitmarkId]) {
        for id in ids {
            self.track(*id, OwnershipState::owned(issuer.account_number().clone(), *id))
                .await;
        }
    }

    /// Current ledger view of a bitmark.
    pub async fn bitmark(&self, bitmark_id: &BitmarkId) -> LedgerResult<Bitmark> {
        let ledger = &self.ledger;
        self.retried("get bitmark", move || async move { ledger.get_bitmark(bitmark_id).await })
            .await
    }

    /// Fetches the bitmark and checks `account` still owns it.
    async fn owned_bitmark(&self, account: &Account, bitmark_id: &BitmarkId) -> LedgerResult<Bitmark> {
        let bitmark = self.bitmark(bitmark_id).await?;
        if &bitmark.owner != account.account_number() {
            return Err(LedgerError::StaleOwnership(format!(
                "{} is owned by {}, not {}",
                bitmark_id,
                bitmark.owner.short(),
                account.account_number().short()
            )));
        }

        // A pending transfer or offer cannot take a new event; the ledger
        // view replaces it once the owner acts again.
        let mut models = self.models.lock().await;
        let in_step = matches!(
            models.get(bitmark_id),
            Some(OwnershipState::Owned { owner, head })
                if owner == &bitmark.owner && head == &bitmark.head_id
        );
        if !in_step {
            models.insert(
                *bitmark_id,
                OwnershipState::owned(bitmark.owner.clone(), bitmark.head_id),
            );
        }
        Ok(bitmark)
    }

    /// Single-signature transfer from `owner` to `receiver`.
    pub async fn transfer(
        &self,
        owner: &Account,
        bitmark_id: &BitmarkId,
        receiver: &AccountNumber,
    ) -> LedgerResult<TxId> {
        let bitmark = self.owned_bitmark(owner, bitmark_id).await?;
        let record = self.builder.build_transfer(&bitmark.head_id, receiver, owner)?;

        let ledger = &self.ledger;
        let record_ref = &record;
        let tx_id = self
            .retried("transfer", move || async move {
                ledger
                    .transfer(record_ref)
                    .await
                    .map_err(|e| e.into_stale_if_conflict("transfer"))
            })
            .await?;

        self.record_event(
            bitmark_id,
            OwnershipEvent::Transferred {
                receiver: receiver.clone(),
                tx_id,
            },
        )
        .await;
        info!(parent: &self.span, bitmark = %bitmark_id, tx = %tx_id, to = %receiver.short(), "transfer submitted");
        Ok(tx_id)
    }

    /// Offers `bitmark_id` to `receiver`, linking to the ledger's current head.
    pub async fn offer(
        &self,
        sender: &Account,
        bitmark_id: &BitmarkId,
        receiver: &AccountNumber,
        extra_info: Option<serde_json::Value>,
    ) -> LedgerResult<PendingOffer> {
        let bitmark = self.owned_bitmark(sender, bitmark_id).await?;
        let head = bitmark.head_id;
        let record = self.builder.build_offer(&head, receiver, sender, Some(bitmark))?;
        let offer_id = self.submit_offer(sender, &record, extra_info).await?;

        self.record_event(
            bitmark_id,
            OwnershipEvent::Offered {
                offer_id: offer_id.clone(),
                receiver: receiver.clone(),
            },
        )
        .await;
        info!(parent: &self.span, bitmark = %bitmark_id, offer = %offer_id, to = %receiver.short(), "transfer offered");
        Ok(PendingOffer {
            offer_id,
            bitmark_id: *bitmark_id,
            record,
        })
    }

    /// Submits an already built offer. A head that moved fails with
    /// `StaleOwnership`.
    pub async fn submit_offer(
        &self,
        sender: &Account,
        record: &TransferOfferRecord,
        extra_info: Option<serde_json::Value>,
    ) -> LedgerResult<String> {
        let ledger = &self.ledger;
        let extra_ref = &extra_info;
        self.retried("submit offer", move || async move {
            ledger
                .submit_offer(sender, record, extra_ref.clone())
                .await
                .map_err(|e| e.into_stale_if_conflict("offer"))
        })
        .await
    }

    pub async fn get_offer(&self, offer_id: &str) -> LedgerResult<TransferOffer> {
        let ledger = &self.ledger;
        self.retried("get offer", move || async move { ledger.get_offer(offer_id).await })
            .await
    }

    pub async fn bitmarks(&self, query: &BitmarkQuery) -> LedgerResult<Vec<Bitmark>> {
        let ledger = &self.ledger;
        self.retried("query bitmarks", move || async move { ledger.query_bitmarks(query).await })
            .await
    }

    /// Open offers made by `account` and those waiting for its answer.
    pub async fn offers(&self, account: &AccountNumber) -> LedgerResult<AccountOffers> {
        let ledger = &self.ledger;
        self.retried("list offers", move || async move { ledger.list_offers(account).await })
            .await
    }

    /// Offers `account` can accept or reject right now.
    pub async fn incoming_offers(&self, account: &AccountNumber) -> LedgerResult<Vec<TransferOffer>> {
        Ok(self.offers(account).await?.received)
    }

    async fn bitmark_for_head(&self, head: &TxId) -> Option<BitmarkId> {
        self.models
            .lock()
            .await
            .iter()
            .find(|(_, state)| state.head() == head)
            .map(|(id, _)| *id)
    }

    /// Countersigns and accepts an offer addressed to `receiver`. Returns
    /// the transfer's transaction id.
    pub async fn accept(&self, receiver: &Account, offer_id: &str) -> LedgerResult<TxId> {
        let offer = self.get_offer(offer_id).await?;
        let countersigned = self.builder.countersign(&offer.record, receiver)?;
        let reply = OfferReply::accept(countersigned.countersignature);

        let ledger = &self.ledger;
        let reply_ref = &reply;
        let tx_id = self
            .retried("accept offer", move || async move {
                ledger
                    .respond_offer(receiver, offer_id, reply_ref)
                    .await
                    .map_err(|e| e.into_stale_if_conflict("accept offer"))
            })
            .await?
            .ok_or_else(|| LedgerError::Serialization("accepted offer returned no transaction".to_string()))?;

        if tx_id != countersigned.id() {
            warn!(parent: &self.span, expected = %countersigned.id(), got = %tx_id, "ledger derived a different transaction id");
        }

        if let Some(bitmark_id) = self.bitmark_for_head(&offer.record.link).await {
            self.record_event(&bitmark_id, OwnershipEvent::Accepted { tx_id }).await;
        }
        info!(parent: &self.span, offer = %offer_id, tx = %tx_id, "transfer offer accepted");
        Ok(tx_id)
    }

    /// Declines an offer; ownership stays with the sender.
    pub async fn reject(&self, receiver: &Account, offer_id: &str) -> LedgerResult<()> {
        let offer = self.get_offer(offer_id).await?;
        let countersigned = self.builder.countersign(&offer.record, receiver)?;

        let ledger = &self.ledger;
        let reply = OfferReply::reject(countersigned.countersignature);
        let reply_ref = &reply;
        self.retried("reject offer", move || async move {
            ledger.respond_offer(receiver, offer_id, reply_ref).await
        })
        .await?;

        if let Some(bitmark_id) = self.bitmark_for_head(&offer.record.link).await {
            self.record_event(&bitmark_id, OwnershipEvent::Rejected).await;
        }
        info!(parent: &self.span, offer = %offer_id, "transfer offer rejected");
        Ok(())
    }

    /// Submits a countersigned transfer directly, without a stored offer.
    pub async fn submit_countersigned(&self, record: &CountersignedTransferRecord) -> LedgerResult<TxId> {
        let ledger = &self.ledger;
        let tx_id = self
            .retried("countersigned transfer", move || async move {
                ledger
                    .submit_countersigned_transfer(record)
                    .await
                    .map_err(|e| e.into_stale_if_conflict("countersigned transfer"))
            })
            .await?;

        if let Some(bitmark_id) = self.bitmark_for_head(&record.link).await {
            let mut models = self.models.lock().await;
            if let Some(state) = models.get_mut(&bitmark_id) {
                let previous_owner = state.authoritative_owner().clone();
                *state = OwnershipState::Transferred {
                    previous_owner,
                    owner: record.owner.clone(),
                    head: tx_id,
                };
            }
        }
        info!(parent: &self.span, tx = %tx_id, "countersigned transfer submitted");
        Ok(tx_id)
    }

    /// Tracker over transaction status.
    pub fn tracker(&self) -> ConfirmationTracker<Transactions<L>> {
        ConfirmationTracker::new(Transactions(self.ledger.clone()))
            .with_poll_interval(self.poll_interval)
            .with_max_concurrency(self.max_concurrency)
            .with_span(self.span.clone())
    }

    /// Tracker over bitmark status.
    pub fn bitmark_tracker(&self) -> ConfirmationTracker<Bitmarks<L>> {
        ConfirmationTracker::new(Bitmarks(self.ledger.clone()))
            .with_poll_interval(self.poll_interval)
            .with_max_concurrency(self.max_concurrency)
            .with_span(self.span.clone())
    }

    /// Waits for the transactions to confirm, then makes the transfers
    /// they carry authoritative in the local model.
    pub async fn await_confirmations<C>(&self, tx_ids: &[TxId], cancel: C) -> LedgerResult<()>
    where
        C: Future<Output = ()>,
    {
        self.tracker().await_all(tx_ids, cancel).await?;

        let mut models = self.models.lock().await;
        for state in models.values_mut() {
            let confirmed = match &*state {
                OwnershipState::Transferred { head, .. } if tx_ids.contains(head) => Some(*head),
                _ => None,
            };
            if let Some(tx_id) = confirmed {
                // Head matches, so the transition cannot fail
                let _ = state.apply(OwnershipEvent::Confirmed { tx_id });
            }
        }
        Ok(())
    }
}
