//! Settlement engine - the paired credit transfer

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use adex_core::{Account, AdexError, AdexResult, AppId, RequesterPolicy, RetryPolicy};
use adex_store::{AccountStore, Adjustment, WriteOutcome};

use crate::ensure_before;

/// A completed settlement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// Advertiser as it stands after paying for the impression
    pub advertiser: Account,
    /// Whether a publisher account received the earned credit
    pub requester_credited: bool,
    /// Commit attempts used, including the successful one
    pub attempts: u32,
}

/// Settlement result
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Settled(SettlementReceipt),
    /// The selected advertiser vanished or can no longer pay; nothing was
    /// written and the caller should select again
    Stale,
}

/// Moves one credit from advertiser to publisher and counts the
/// impression, as a single conditional commit.
///
/// The advertiser side is guarded by the version of the snapshot whose
/// balance was checked, so the floor check and the debit can never be
/// separated by another writer. Lost races are retried against a fresh
/// snapshot under a bounded backoff.
pub struct SettlementEngine<S> {
    store: Arc<S>,
    min_credits: i64,
    requester_policy: RequesterPolicy,
    retry: RetryPolicy,
}

impl<S: AccountStore> SettlementEngine<S> {
    pub fn new(
        store: Arc<S>,
        min_credits: i64,
        requester_policy: RequesterPolicy,
        retry: RetryPolicy,
    ) -> Self {
        SettlementEngine {
            store,
            min_credits,
            requester_policy,
            retry,
        }
    }

    pub fn settle(&self, requester: &AppId, selected: &AppId) -> AdexResult<Settlement> {
        self.settle_before(requester, selected, None)
    }

    /// Settle, but never start a commit after `deadline`.
    ///
    /// A commit that has started always runs to completion and its real
    /// outcome is reported.
    pub fn settle_before(
        &self,
        requester: &AppId,
        selected: &AppId,
        deadline: Option<Instant>,
    ) -> AdexResult<Settlement> {
        if requester == selected {
            tracing::debug!(app = %requester, "refusing to settle an account against itself");
            return Ok(Settlement::Stale);
        }

        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            // Re-validate the advertiser against a fresh snapshot
            let Some(advertiser) = self.store.get(selected)? else {
                tracing::debug!(advertiser = %selected, "selected advertiser no longer exists");
                return Ok(Settlement::Stale);
            };
            if !advertiser.is_eligible(self.min_credits) {
                tracing::debug!(
                    advertiser = %selected,
                    credits = advertiser.credits,
                    "selected advertiser fell below the credit floor"
                );
                return Ok(Settlement::Stale);
            }

            let publisher = self.publisher_adjustment(requester)?;
            let requester_credited = publisher.is_some();

            let mut batch = Vec::with_capacity(2);
            batch.push(Adjustment::on(&advertiser).credits(-1).impressions(1));
            batch.extend(publisher);

            ensure_before(deadline, "settlement commit")?;
            match self.store.commit(&batch)? {
                WriteOutcome::Applied => {
                    let mut settled = advertiser;
                    settled.credits -= 1;
                    settled.impressions += 1;
                    settled.version += 1;

                    tracing::debug!(
                        publisher = %requester,
                        advertiser = %selected,
                        attempt,
                        requester_credited,
                        "impression settled"
                    );
                    return Ok(Settlement::Settled(SettlementReceipt {
                        advertiser: settled,
                        requester_credited,
                        attempts: attempt,
                    }));
                }
                outcome => {
                    tracing::trace!(advertiser = %selected, attempt, ?outcome, "settlement lost a race");
                    if attempt < max_attempts {
                        let delay = self.retry.backoff(attempt);
                        if !delay.is_zero() {
                            thread::sleep(delay);
                        }
                    }
                }
            }
        }

        tracing::warn!(
            publisher = %requester,
            advertiser = %selected,
            attempts = max_attempts,
            "settlement retries exhausted"
        );
        Err(AdexError::TransientConflict {
            attempts: max_attempts,
        })
    }

    /// The requester's half of the batch, if it gets one
    fn publisher_adjustment(&self, requester: &AppId) -> AdexResult<Option<Adjustment>> {
        if self.store.get(requester)?.is_some() {
            return Ok(Some(Adjustment::existing(requester.clone()).credits(1)));
        }

        match self.requester_policy {
            RequesterPolicy::Skip => {
                tracing::debug!(publisher = %requester, "unknown publisher, credit skipped");
                Ok(None)
            }
            RequesterPolicy::AutoCreate => {
                Ok(Some(Adjustment::provision(requester.clone()).credits(1)))
            }
        }
    }
}
