//! Eligibility filter

use std::sync::Arc;

use adex_core::{Account, AdexResult, AppId};
use adex_store::AccountStore;

/// Whether the requesting application has an account
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequesterStatus {
    Known,
    Unknown,
}

/// Candidate advertisers for one fill request
#[derive(Clone, Debug)]
pub struct Eligibility {
    pub requester: RequesterStatus,
    /// Immutable snapshot taken once per request
    pub candidates: Vec<Account>,
}

impl Eligibility {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Produces the accounts that may be shown to a requester:
/// everyone except the requester, with at least `min_credits`.
pub struct EligibilityFilter<S> {
    store: Arc<S>,
    min_credits: i64,
}

impl<S: AccountStore> EligibilityFilter<S> {
    pub fn new(store: Arc<S>, min_credits: i64) -> Self {
        EligibilityFilter { store, min_credits }
    }

    /// Snapshot the eligible set for `requester`.
    ///
    /// An unknown requester is reported, not rejected: the remaining
    /// predicate still applies and the candidates are returned as usual.
    pub fn find_eligible(&self, requester: &AppId) -> AdexResult<Eligibility> {
        let status = match self.store.get(requester)? {
            Some(_) => RequesterStatus::Known,
            None => RequesterStatus::Unknown,
        };

        let mut candidates = self.store.find_eligible(requester, self.min_credits)?;
        // The store is external; hold it to the predicate anyway
        candidates.retain(|account| account.is_candidate_for(requester, self.min_credits));

        Ok(Eligibility {
            requester: status,
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ledger;
    use adex_core::{AdCreative, AdexError, AdexResult};
    use adex_store::{Adjustment, WriteOutcome};
    use proptest::prelude::*;

    #[test]
    fn test_filter_example_ledger() {
        let store = ledger(&[("A", 100), ("B", 0), ("C", 5)]);
        let filter = EligibilityFilter::new(store, 1);

        let eligibility = filter.find_eligible(&AppId::new("A")).unwrap();
        assert_eq!(eligibility.requester, RequesterStatus::Known);
        let ids: Vec<_> = eligibility.candidates.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["C"]);
    }

    #[test]
    fn test_empty_set_distinct_from_unknown_requester() {
        let store = ledger(&[("A", 100), ("B", 0)]);
        let filter = EligibilityFilter::new(store, 1);

        let known = filter.find_eligible(&AppId::new("A")).unwrap();
        assert!(known.is_empty());
        assert_eq!(known.requester, RequesterStatus::Known);

        let unknown = filter.find_eligible(&AppId::new("Z")).unwrap();
        assert_eq!(unknown.requester, RequesterStatus::Unknown);
        assert_eq!(unknown.len(), 1);
    }

    #[test]
    fn test_floor_follows_configuration() {
        let store = ledger(&[("A", 1), ("B", 3), ("C", 10)]);
        let filter = EligibilityFilter::new(store, 5);

        let eligibility = filter.find_eligible(&AppId::new("A")).unwrap();
        let ids: Vec<_> = eligibility.candidates.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["C"]);
    }

    proptest! {
        #[test]
        fn prop_candidates_are_exactly_the_eligible_others(
            balances in prop::collection::vec(-3i64..6, 1..10),
            requester in 0usize..12,
            min_credits in 1i64..4,
        ) {
            let names: Vec<String> = (0..balances.len()).map(|i| format!("app-{i}")).collect();
            let entries: Vec<(&str, i64)> = names
                .iter()
                .map(String::as_str)
                .zip(balances.iter().copied())
                .collect();
            let filter = EligibilityFilter::new(ledger(&entries), min_credits);
            let requester = AppId::new(format!("app-{requester}"));

            let eligibility = filter.find_eligible(&requester).unwrap();
            let expected: Vec<&str> = entries
                .iter()
                .filter(|(id, credits)| *id != requester.as_str() && *credits >= min_credits)
                .map(|(id, _)| *id)
                .collect();
            let mut found: Vec<&str> = eligibility.candidates.iter().map(|a| a.id.as_str()).collect();
            found.sort_unstable();
            let mut expected = expected;
            expected.sort_unstable();

            prop_assert_eq!(found, expected);
            prop_assert_eq!(
                eligibility.requester == RequesterStatus::Known,
                names.iter().any(|n| n == requester.as_str())
            );
        }
    }

    /// Store that ignores the query predicate entirely
    struct SloppyStore(Vec<Account>);

    impl AccountStore for SloppyStore {
        fn get(&self, id: &AppId) -> AdexResult<Option<Account>> {
            Ok(self.0.iter().find(|a| &a.id == id).cloned())
        }
        fn find_eligible(&self, _: &AppId, _: i64) -> AdexResult<Vec<Account>> {
            Ok(self.0.clone())
        }
        fn atomic_adjust(&self, _: &AppId, _: i64, _: u64) -> AdexResult<WriteOutcome> {
            Ok(WriteOutcome::NotFound)
        }
        fn increment_clicks(&self, _: &AppId) -> AdexResult<WriteOutcome> {
            Ok(WriteOutcome::NotFound)
        }
        fn commit(&self, _: &[Adjustment]) -> AdexResult<WriteOutcome> {
            Ok(WriteOutcome::Conflict)
        }
        fn insert(&self, account: Account) -> AdexResult<()> {
            Err(AdexError::DuplicateAccount(account.id))
        }
        fn snapshot(&self) -> AdexResult<Vec<Account>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_filter_enforces_predicate_over_sloppy_store() {
        let store = Arc::new(SloppyStore(vec![
            Account::new("A", AdCreative::default(), 9),
            Account::new("B", AdCreative::default(), 0),
            Account::new("C", AdCreative::default(), 2),
        ]));
        let filter = EligibilityFilter::new(store, 1);

        let eligibility = filter.find_eligible(&AppId::new("A")).unwrap();
        let ids: Vec<_> = eligibility.candidates.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["C"]);
    }
}
