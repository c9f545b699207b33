//! Contention runs
//!
//! Many threads fill ad slots at the same instant while exactly one
//! advertiser holds inventory. Publishers are unregistered so nobody
//! earns their way into eligibility mid-run, which makes the expected
//! number of fills equal to the advertiser's starting balance.

use std::sync::{Arc, Barrier};
use std::thread;

use adex_core::{
    Account, AdCreative, AdexError, AdexResult, AppId, ExchangeConfig, FillOutcome,
    RequesterPolicy, RetryPolicy,
};
use adex_exchange::Exchange;
use adex_store::{AccountStore, MemoryStore};

/// Contention run configuration
#[derive(Clone, Debug)]
pub struct ContentionConfig {
    /// Concurrent publishers, one fill each
    pub threads: usize,
    /// Starting balance of the lone advertiser
    pub advertiser_credits: i64,
    pub retry: RetryPolicy,
}

impl Default for ContentionConfig {
    fn default() -> Self {
        ContentionConfig {
            threads: 8,
            advertiser_credits: 1,
            retry: RetryPolicy::default(),
        }
    }
}

/// What a contention run left behind
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentionReport {
    pub filled: usize,
    pub no_inventory: usize,
    /// Fills that gave up with a retryable error
    pub errors: usize,
    pub advertiser_credits_after: i64,
    pub advertiser_impressions_after: u64,
}

impl ContentionReport {
    /// Every successful fill cost the advertiser exactly one credit and
    /// the balance never went below zero
    pub fn is_consistent(&self, config: &ContentionConfig) -> bool {
        self.advertiser_credits_after >= 0
            && self.advertiser_impressions_after == self.filled as u64
            && config.advertiser_credits - self.advertiser_credits_after == self.filled as i64
            && self.filled + self.no_inventory + self.errors == config.threads
    }
}

/// Runs the same burst of fills against a fresh ledger each time
pub struct ContentionHarness {
    config: ContentionConfig,
}

impl ContentionHarness {
    pub const ADVERTISER: &'static str = "advertiser";

    pub fn new(config: ContentionConfig) -> Self {
        ContentionHarness { config }
    }

    pub fn config(&self) -> &ContentionConfig {
        &self.config
    }

    pub fn run(&self) -> AdexResult<ContentionReport> {
        let advertiser = AppId::new(Self::ADVERTISER);
        let store = Arc::new(MemoryStore::new());
        store.insert(Account::new(
            advertiser.clone(),
            AdCreative::new("https://cdn.example/ad.png", "https://apps.example/ad", "Install"),
            self.config.advertiser_credits,
        ))?;

        let exchange = Exchange::new(
            Arc::clone(&store),
            ExchangeConfig {
                requester_policy: RequesterPolicy::Skip,
                retry: self.config.retry.clone(),
                ..ExchangeConfig::default()
            },
        )?;

        let barrier = Barrier::new(self.config.threads);
        let outcomes: Vec<AdexResult<FillOutcome>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..self.config.threads)
                .map(|i| {
                    let exchange = &exchange;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        let publisher = AppId::new(format!("publisher-{i}"));
                        barrier.wait();
                        exchange.fill(&publisher)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(AdexError::Internal("fill thread panicked".into()))
                    })
                })
                .collect()
        });

        let mut report = ContentionReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(FillOutcome::Filled(_)) => report.filled += 1,
                Ok(FillOutcome::NoInventory) => report.no_inventory += 1,
                Err(e) if e.is_retryable() => report.errors += 1,
                Err(e) => return Err(e),
            }
        }

        let after = exchange.account(&advertiser)?;
        report.advertiser_credits_after = after.credits;
        report.advertiser_impressions_after = after.impressions;

        tracing::debug!(
            threads = self.config.threads,
            filled = report.filled,
            no_inventory = report.no_inventory,
            errors = report.errors,
            "contention run finished"
        );
        Ok(report)
    }
}
