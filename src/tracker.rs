//! Confirmation tracker.
//!
//! A single pass queries every identifier with at most `max_concurrency`
//! requests in flight and waits for all of them. A query that errors counts
//! as "not yet confirmed"; it never aborts the pass. The blocking variants
//! repeat the pass until everything is final, re-querying only the ids that
//! were not final yet, and always take a cancellation future or deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, Instrument, Span};

use crate::client::LedgerApi;
use crate::error::{LedgerError, LedgerResult};
use crate::ids::TxId;
use crate::types::Settlement;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Where settlement status is read from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// `true` once `id` has reached its terminal state.
    async fn is_final(&self, id: &TxId) -> LedgerResult<bool>;
}

/// Transaction status: final once `confirmed`.
pub struct Transactions<L>(pub Arc<L>);

/// Bitmark status: final once `settled`.
pub struct Bitmarks<L>(pub Arc<L>);

#[async_trait]
impl<L: LedgerApi> StatusSource for Transactions<L> {
    async fn is_final(&self, id: &TxId) -> LedgerResult<bool> {
        Ok(self.0.get_tx(id).await?.status.is_final())
    }
}

#[async_trait]
impl<L: LedgerApi> StatusSource for Bitmarks<L> {
    async fn is_final(&self, id: &TxId) -> LedgerResult<bool> {
        Ok(self.0.get_bitmark(id).await?.status.is_final())
    }
}

/// Outcome of one polling pass, in the order the ids were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfirmationReport {
    pub confirmed: Vec<TxId>,
    pub pending: Vec<TxId>,
    pub failed: Vec<(TxId, LedgerError)>,
}

impl ConfirmationReport {
    pub fn all_confirmed(&self) -> bool {
        self.pending.is_empty() && self.failed.is_empty()
    }

    /// Ids still to poll: pending ones and those whose query failed.
    pub fn unconfirmed(&self) -> Vec<TxId> {
        self.pending
            .iter()
            .copied()
            .chain(self.failed.iter().map(|(id, _)| *id))
            .collect()
    }
}

pub struct ConfirmationTracker<S> {
    source: S,
    poll_interval: Duration,
    max_concurrency: usize,
    span: Span,
}

impl<S: StatusSource> ConfirmationTracker<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            span: Span::none(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// One non-blocking pass over `ids`.
    pub async fn check_all(&self, ids: &[TxId]) -> ConfirmationReport {
        let results: Vec<(TxId, LedgerResult<bool>)> = stream::iter(ids.iter().copied())
            .map(|id| async move { (id, self.source.is_final(&id).await) })
            .buffered(self.max_concurrency)
            .collect::<Vec<_>>()
            .instrument(self.span.clone())
            .await;

        let mut report = ConfirmationReport::default();
        for (id, result) in results {
            match result {
                Ok(true) => report.confirmed.push(id),
                Ok(false) => report.pending.push(id),
                Err(err) => {
                    debug!(parent: &self.span, %id, error = %err, "status query failed");
                    report.failed.push((id, err));
                }
            }
        }
        report
    }

    /// `true` only if every id is final in this pass.
    pub async fn check_all_confirmed(&self, ids: &[TxId]) -> bool {
        self.check_all(ids).await.all_confirmed()
    }

    /// Polls until every id is final or `cancel` completes, in which case
    /// it fails with [`LedgerError::Cancelled`].
    pub async fn await_all<C>(&self, ids: &[TxId], cancel: C) -> LedgerResult<()>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let mut remaining = ids.to_vec();
        let mut round = 0u64;

        loop {
            round += 1;
            let report = tokio::select! {
                report = self.check_all(&remaining) => report,
                _ = &mut cancel => return Err(LedgerError::Cancelled),
            };

            if report.all_confirmed() {
                info!(parent: &self.span, count = ids.len(), rounds = round, "all confirmed");
                return Ok(());
            }

            remaining = report.unconfirmed();
            info!(
                parent: &self.span,
                unconfirmed = remaining.len(),
                total = ids.len(),
                "waiting for confirmation"
            );

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = &mut cancel => return Err(LedgerError::Cancelled),
            }
        }
    }

    /// Like [`Self::await_all`] but gives up at `deadline` with
    /// [`LedgerError::Timeout`].
    pub async fn await_all_until(&self, ids: &[TxId], deadline: Instant) -> LedgerResult<()> {
        let budget = deadline.saturating_duration_since(Instant::now());
        match self.await_all(ids, sleep_until(deadline)).await {
            Err(LedgerError::Cancelled) => Err(LedgerError::Timeout(budget.as_millis() as u64)),
            other => other,
        }
    }
}
