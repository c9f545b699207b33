//! The account store seam

use std::sync::Arc;

use adex_core::{Account, AdexResult, AppId};

/// Outcome of a write against the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied in full
    Applied,
    /// An expectation no longer held; nothing was written
    Conflict,
    /// A required account does not exist; nothing was written
    NotFound,
}

impl WriteOutcome {
    #[inline]
    pub fn is_applied(self) -> bool {
        self == WriteOutcome::Applied
    }
}

/// Precondition an adjustment places on its account
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    /// The account exists and has not been written since `version` was read
    Version(u64),
    /// The account exists, whatever its version
    Exists,
    /// The account does not exist yet; it is created with a zero balance
    Absent,
}

/// One account's part of a conditional batch write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adjustment {
    pub id: AppId,
    pub expect: Expect,
    pub credits_delta: i64,
    pub impressions_delta: u64,
}

impl Adjustment {
    /// Adjustment guarded by the version of a previously read snapshot
    pub fn on(account: &Account) -> Self {
        Adjustment {
            id: account.id.clone(),
            expect: Expect::Version(account.version),
            credits_delta: 0,
            impressions_delta: 0,
        }
    }

    /// Adjustment that only requires the account to exist
    pub fn existing(id: AppId) -> Self {
        Adjustment {
            id,
            expect: Expect::Exists,
            credits_delta: 0,
            impressions_delta: 0,
        }
    }

    /// Adjustment that provisions a missing account
    pub fn provision(id: AppId) -> Self {
        Adjustment {
            id,
            expect: Expect::Absent,
            credits_delta: 0,
            impressions_delta: 0,
        }
    }

    pub fn credits(mut self, delta: i64) -> Self {
        self.credits_delta = delta;
        self
    }

    pub fn impressions(mut self, delta: u64) -> Self {
        self.impressions_delta = delta;
        self
    }
}

/// Durable mapping from application identity to its account.
///
/// Every method fails only when the backend itself cannot be reached
/// (`AdexError::StoreUnavailable`); lost races and missing accounts are
/// reported through the returned values.
pub trait AccountStore: Send + Sync {
    /// Look up one account
    fn get(&self, id: &AppId) -> AdexResult<Option<Account>>;

    /// All accounts other than `exclude` with at least `min_credits`
    fn find_eligible(&self, exclude: &AppId, min_credits: i64) -> AdexResult<Vec<Account>>;

    /// Unconditionally add the deltas to one account
    fn atomic_adjust(
        &self,
        id: &AppId,
        credits_delta: i64,
        impressions_delta: u64,
    ) -> AdexResult<WriteOutcome>;

    /// Count a click; independent of credits
    fn increment_clicks(&self, id: &AppId) -> AdexResult<WriteOutcome>;

    /// Apply every adjustment or none of them
    fn commit(&self, batch: &[Adjustment]) -> AdexResult<WriteOutcome>;

    /// Register a new account
    fn insert(&self, account: Account) -> AdexResult<()>;

    /// Point-in-time copy of the whole ledger
    fn snapshot(&self) -> AdexResult<Vec<Account>>;
}

impl<S: AccountStore + ?Sized> AccountStore for Arc<S> {
    fn get(&self, id: &AppId) -> AdexResult<Option<Account>> {
        (**self).get(id)
    }

    fn find_eligible(&self, exclude: &AppId, min_credits: i64) -> AdexResult<Vec<Account>> {
        (**self).find_eligible(exclude, min_credits)
    }

    fn atomic_adjust(
        &self,
        id: &AppId,
        credits_delta: i64,
        impressions_delta: u64,
    ) -> AdexResult<WriteOutcome> {
        (**self).atomic_adjust(id, credits_delta, impressions_delta)
    }

    fn increment_clicks(&self, id: &AppId) -> AdexResult<WriteOutcome> {
        (**self).increment_clicks(id)
    }

    fn commit(&self, batch: &[Adjustment]) -> AdexResult<WriteOutcome> {
        (**self).commit(batch)
    }

    fn insert(&self, account: Account) -> AdexResult<()> {
        (**self).insert(account)
    }

    fn snapshot(&self) -> AdexResult<Vec<Account>> {
        (**self).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adex_core::AdCreative;

    #[test]
    fn test_adjustment_builder_captures_version() {
        let mut account = Account::new("adv", AdCreative::default(), 5);
        account.version = 9;

        let adj = Adjustment::on(&account).credits(-1).impressions(1);
        assert_eq!(adj.id, AppId::new("adv"));
        assert_eq!(adj.expect, Expect::Version(9));
        assert_eq!(adj.credits_delta, -1);
        assert_eq!(adj.impressions_delta, 1);
    }

    #[test]
    fn test_existing_ignores_version() {
        let adj = Adjustment::existing(AppId::new("pub")).credits(1);
        assert_eq!(adj.expect, Expect::Exists);
    }

    #[test]
    fn test_provision_expects_absence() {
        let adj = Adjustment::provision(AppId::new("new")).credits(1);
        assert_eq!(adj.expect, Expect::Absent);
        assert_eq!(adj.credits_delta, 1);
        assert_eq!(adj.impressions_delta, 0);
    }
}
