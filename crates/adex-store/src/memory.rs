//! In-process ledger

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use adex_core::{Account, AdCreative, AdexError, AdexResult, AppId};

use crate::{AccountStore, Adjustment, Expect, WriteOutcome};

type Slot = Arc<Mutex<Account>>;

/// Ledger held in memory.
///
/// Each account sits behind its own mutex, so writes to different
/// accounts never contend. The outer map lock is only taken for writing
/// when accounts are created; every other operation holds it shared for
/// its whole duration, which makes a creating commit fully exclusive.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<BTreeMap<AppId, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Build a ledger from existing accounts
    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> AdexResult<Self> {
        let mut map = BTreeMap::new();
        for account in accounts {
            if map.contains_key(&account.id) {
                return Err(AdexError::DuplicateAccount(account.id));
            }
            map.insert(account.id.clone(), Arc::new(Mutex::new(account)));
        }
        Ok(MemoryStore {
            accounts: RwLock::new(map),
        })
    }

    /// Build a ledger from a JSON array of accounts
    pub fn from_json(json: &str) -> AdexResult<Self> {
        let accounts: Vec<Account> = serde_json::from_str(json)
            .map_err(|e| AdexError::InvalidConfig(format!("invalid ledger seed: {e}")))?;
        Self::from_accounts(accounts)
    }

    /// Export the ledger as a JSON array
    pub fn to_json(&self) -> AdexResult<String> {
        let accounts = self.snapshot()?;
        serde_json::to_string_pretty(&accounts)
            .map_err(|e| AdexError::Internal(format!("ledger export failed: {e}")))
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// Sum of all balances, widened so no seed can overflow it
    pub fn total_credits(&self) -> i128 {
        self.accounts
            .read()
            .values()
            .map(|slot| i128::from(slot.lock().credits))
            .sum()
    }

    fn with_account<T>(&self, id: &AppId, f: impl FnOnce(&mut Account) -> T) -> Option<T> {
        let accounts = self.accounts.read();
        let slot = accounts.get(id)?;
        let mut account = slot.lock();
        Some(f(&mut account))
    }
}

/// Counters after applying the deltas, or an error if either overflows.
///
/// Overflow refuses the write instead of clamping, which would silently
/// create or destroy credits.
fn adjusted(account: &Account, credits_delta: i64, impressions_delta: u64) -> AdexResult<(i64, u64)> {
    match (
        account.credits.checked_add(credits_delta),
        account.impressions.checked_add(impressions_delta),
    ) {
        (Some(credits), Some(impressions)) => Ok((credits, impressions)),
        _ => Err(AdexError::Internal(format!(
            "counter overflow adjusting {}",
            account.id
        ))),
    }
}

fn apply(account: &mut Account, (credits, impressions): (i64, u64)) {
    account.credits = credits;
    account.impressions = impressions;
    account.version += 1;
}

/// How far a batch got before any write
enum Staged {
    /// All expectations hold; these accounts still have to be inserted
    Applied(Vec<Account>),
    /// An expectation failed; nothing was written
    Refused(WriteOutcome),
}

/// Validate and apply a batch sorted by id.
///
/// Existing accounts are locked in id order, so concurrent commits over
/// overlapping accounts cannot deadlock. Every expectation and every new
/// counter value is checked before the first account is written.
fn apply_sorted(accounts: &BTreeMap<AppId, Slot>, order: &[&Adjustment]) -> AdexResult<Staged> {
    let mut locked: Vec<(MutexGuard<'_, Account>, (i64, u64))> = Vec::with_capacity(order.len());
    let mut created = Vec::new();

    for adj in order {
        match adj.expect {
            Expect::Version(_) | Expect::Exists => {
                let Some(slot) = accounts.get(&adj.id) else {
                    return Ok(Staged::Refused(WriteOutcome::NotFound));
                };
                let account = slot.lock();
                if let Expect::Version(expected) = adj.expect {
                    if expected != account.version {
                        return Ok(Staged::Refused(WriteOutcome::Conflict));
                    }
                }
                let next = adjusted(&account, adj.credits_delta, adj.impressions_delta)?;
                locked.push((account, next));
            }
            Expect::Absent => {
                if accounts.contains_key(&adj.id) {
                    return Ok(Staged::Refused(WriteOutcome::Conflict));
                }
                let mut account = Account::new(adj.id.clone(), AdCreative::default(), 0);
                let next = adjusted(&account, adj.credits_delta, adj.impressions_delta)?;
                apply(&mut account, next);
                created.push(account);
            }
        }
    }

    for (account, next) in locked.iter_mut() {
        apply(account, *next);
    }

    Ok(Staged::Applied(created))
}

impl AccountStore for MemoryStore {
    fn get(&self, id: &AppId) -> AdexResult<Option<Account>> {
        Ok(self.with_account(id, |account| account.clone()))
    }

    fn find_eligible(&self, exclude: &AppId, min_credits: i64) -> AdexResult<Vec<Account>> {
        let accounts = self.accounts.read();
        let eligible = accounts
            .iter()
            .filter(|(id, _)| *id != exclude)
            .filter_map(|(_, slot)| {
                let account = slot.lock();
                account.is_eligible(min_credits).then(|| account.clone())
            })
            .collect();
        Ok(eligible)
    }

    fn atomic_adjust(
        &self,
        id: &AppId,
        credits_delta: i64,
        impressions_delta: u64,
    ) -> AdexResult<WriteOutcome> {
        let written = self.with_account(id, |account| {
            let next = adjusted(account, credits_delta, impressions_delta)?;
            apply(account, next);
            Ok(())
        });
        match written {
            Some(result) => result.map(|()| WriteOutcome::Applied),
            None => Ok(WriteOutcome::NotFound),
        }
    }

    fn increment_clicks(&self, id: &AppId) -> AdexResult<WriteOutcome> {
        let outcome = self
            .with_account(id, |account| account.clicks = account.clicks.saturating_add(1))
            .map_or(WriteOutcome::NotFound, |_| WriteOutcome::Applied);
        Ok(outcome)
    }

    fn commit(&self, batch: &[Adjustment]) -> AdexResult<WriteOutcome> {
        if batch.is_empty() {
            return Ok(WriteOutcome::Applied);
        }

        let mut order: Vec<&Adjustment> = batch.iter().collect();
        order.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(pair) = order.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(AdexError::Internal(format!(
                "batch adjusts {} more than once",
                pair[0].id
            )));
        }

        let outcome = if order.iter().any(|adj| adj.expect == Expect::Absent) {
            let mut accounts = self.accounts.write();
            match apply_sorted(&accounts, &order)? {
                Staged::Applied(created) => {
                    for account in created {
                        tracing::debug!(app = %account.id, "provisioned account during commit");
                        accounts.insert(account.id.clone(), Arc::new(Mutex::new(account)));
                    }
                    WriteOutcome::Applied
                }
                Staged::Refused(outcome) => outcome,
            }
        } else {
            let accounts = self.accounts.read();
            match apply_sorted(&accounts, &order)? {
                Staged::Applied(_) => WriteOutcome::Applied,
                Staged::Refused(outcome) => outcome,
            }
        };

        if !outcome.is_applied() {
            tracing::trace!(?outcome, size = batch.len(), "commit rejected");
        }
        Ok(outcome)
    }

    fn insert(&self, account: Account) -> AdexResult<()> {
        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.id) {
            return Err(AdexError::DuplicateAccount(account.id));
        }
        tracing::debug!(app = %account.id, credits = account.credits, "account registered");
        accounts.insert(account.id.clone(), Arc::new(Mutex::new(account)));
        Ok(())
    }

    fn snapshot(&self) -> AdexResult<Vec<Account>> {
        let accounts = self.accounts.read();
        Ok(accounts.values().map(|slot| slot.lock().clone()).collect())
    }
}
