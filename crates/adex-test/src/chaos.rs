//! Fault injection for account stores
//!
//! Simulates a hostile backend:
//! - Lost optimistic races on commit
//! - Backend outages on any call
//!
//! Injected faults happen before the wrapped store is touched, so a
//! failed call never leaves a partial write behind.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use adex_core::{Account, AdexError, AdexResult, AppId};
use adex_store::{AccountStore, Adjustment, WriteOutcome};

/// Fault injection configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Probability that a commit reports a conflict (0.0 - 1.0)
    pub conflict_rate: f64,
    /// Probability that any call finds the backend unreachable (0.0 - 1.0)
    pub outage_rate: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            conflict_rate: 0.1,
            outage_rate: 0.0,
            seed: 42,
        }
    }
}

impl ChaosConfig {
    /// Healthy backend
    pub fn calm() -> Self {
        ChaosConfig {
            conflict_rate: 0.0,
            outage_rate: 0.0,
            seed: 42,
        }
    }

    /// Busy backend losing many races
    pub fn contended() -> Self {
        ChaosConfig {
            conflict_rate: 0.4,
            outage_rate: 0.0,
            seed: 42,
        }
    }

    /// Flaky backend
    pub fn hostile() -> Self {
        ChaosConfig {
            conflict_rate: 0.5,
            outage_rate: 0.05,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Fault injection statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChaosStats {
    pub calls: u64,
    pub commits: u64,
    pub conflicts_injected: u64,
    pub outages_injected: u64,
}

struct ChaosState {
    rng: StdRng,
    stats: ChaosStats,
}

/// Store wrapper that injects faults
pub struct ChaosStore<S> {
    inner: S,
    config: ChaosConfig,
    state: Mutex<ChaosState>,
}

impl<S: AccountStore> ChaosStore<S> {
    pub fn new(inner: S, config: ChaosConfig) -> Self {
        ChaosStore {
            state: Mutex::new(ChaosState {
                rng: StdRng::seed_from_u64(config.seed),
                stats: ChaosStats::default(),
            }),
            inner,
            config,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn stats(&self) -> ChaosStats {
        self.state.lock().stats.clone()
    }

    fn outage(&self) -> AdexResult<()> {
        let mut state = self.state.lock();
        state.stats.calls += 1;
        if self.config.outage_rate > 0.0 && state.rng.gen_bool(self.config.outage_rate) {
            state.stats.outages_injected += 1;
            return Err(AdexError::StoreUnavailable("injected outage".into()));
        }
        Ok(())
    }

    fn lose_race(&self) -> bool {
        let mut state = self.state.lock();
        state.stats.commits += 1;
        if self.config.conflict_rate > 0.0 && state.rng.gen_bool(self.config.conflict_rate) {
            state.stats.conflicts_injected += 1;
            return true;
        }
        false
    }
}

impl<S: AccountStore> AccountStore for ChaosStore<S> {
    fn get(&self, id: &AppId) -> AdexResult<Option<Account>> {
        self.outage()?;
        self.inner.get(id)
    }

    fn find_eligible(&self, exclude: &AppId, min_credits: i64) -> AdexResult<Vec<Account>> {
        self.outage()?;
        self.inner.find_eligible(exclude, min_credits)
    }

    fn atomic_adjust(
        &self,
        id: &AppId,
        credits_delta: i64,
        impressions_delta: u64,
    ) -> AdexResult<WriteOutcome> {
        self.outage()?;
        self.inner.atomic_adjust(id, credits_delta, impressions_delta)
    }

    fn increment_clicks(&self, id: &AppId) -> AdexResult<WriteOutcome> {
        self.outage()?;
        self.inner.increment_clicks(id)
    }

    fn commit(&self, batch: &[Adjustment]) -> AdexResult<WriteOutcome> {
        self.outage()?;
        if self.lose_race() {
            return Ok(WriteOutcome::Conflict);
        }
        self.inner.commit(batch)
    }

    fn insert(&self, account: Account) -> AdexResult<()> {
        self.outage()?;
        self.inner.insert(account)
    }

    fn snapshot(&self) -> AdexResult<Vec<Account>> {
        self.outage()?;
        self.inner.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adex_core::AdCreative;
    use adex_store::MemoryStore;

    fn store(config: ChaosConfig) -> ChaosStore<MemoryStore> {
        let inner = MemoryStore::from_accounts([
            Account::new("a", AdCreative::default(), 10),
            Account::new("b", AdCreative::default(), 10),
        ])
        .unwrap();
        ChaosStore::new(inner, config)
    }

    #[test]
    fn test_calm_store_is_transparent() {
        let chaos = store(ChaosConfig::calm());
        let a = chaos.get(&AppId::new("a")).unwrap().unwrap();
        let batch = [Adjustment::on(&a).credits(-1)];
        assert_eq!(chaos.commit(&batch).unwrap(), WriteOutcome::Applied);

        let stats = chaos.stats();
        assert_eq!(stats.conflicts_injected, 0);
        assert_eq!(stats.outages_injected, 0);
        assert_eq!(stats.commits, 1);
    }

    #[test]
    fn test_injected_conflicts_write_nothing() {
        let chaos = store(ChaosConfig {
            conflict_rate: 1.0,
            outage_rate: 0.0,
            seed: 1,
        });
        let a = chaos.get(&AppId::new("a")).unwrap().unwrap();
        let batch = [Adjustment::on(&a).credits(-1)];

        for _ in 0..5 {
            assert_eq!(chaos.commit(&batch).unwrap(), WriteOutcome::Conflict);
        }
        assert_eq!(chaos.inner().total_credits(), 20);
        assert_eq!(chaos.stats().conflicts_injected, 5);
    }

    #[test]
    fn test_injected_outages_surface_as_unavailable() {
        let chaos = store(ChaosConfig {
            conflict_rate: 0.0,
            outage_rate: 1.0,
            seed: 1,
        });
        assert!(matches!(
            chaos.find_eligible(&AppId::new("a"), 1),
            Err(AdexError::StoreUnavailable(_))
        ));
        assert!(chaos.increment_clicks(&AppId::new("a")).is_err());
        assert_eq!(chaos.inner().get(&AppId::new("a")).unwrap().unwrap().clicks, 0);
    }

    #[test]
    fn test_fault_sequence_is_seeded() {
        let run = || {
            let chaos = store(ChaosConfig::hostile().with_seed(9));
            (0..50)
                .map(|_| chaos.get(&AppId::new("a")).is_ok())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
