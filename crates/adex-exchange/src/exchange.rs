//! The exchange allocator

use std::sync::Arc;
use std::time::Instant;

use adex_core::{
    Account, AdCreative, AdexError, AdexResult, AppId, ExchangeConfig, FillOutcome,
};
use adex_store::AccountStore;

use crate::{
    ensure_before, ClickRecorder, EligibilityFilter, RequesterStatus, Selector, Settlement,
    SettlementEngine, UniformSelector,
};

/// Everything known about one fill request once it is done
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FillReport {
    pub outcome: FillOutcome,
    pub requester: RequesterStatus,
    /// Whether the requester's account earned the credit
    pub requester_credited: bool,
    /// Eligibility snapshots discarded because the pick went stale
    pub reselections: u32,
}

/// Fills ad slots and records clicks against a shared account store
pub struct Exchange<S, Sel = UniformSelector> {
    store: Arc<S>,
    filter: EligibilityFilter<S>,
    selector: Sel,
    settlement: SettlementEngine<S>,
    clicks: ClickRecorder<S>,
    config: ExchangeConfig,
}

impl<S: AccountStore> Exchange<S, UniformSelector> {
    /// Create an exchange with uniform random selection
    pub fn new(store: Arc<S>, config: ExchangeConfig) -> AdexResult<Self> {
        Self::with_selector(store, config, UniformSelector)
    }
}

impl<S: AccountStore, Sel: Selector> Exchange<S, Sel> {
    /// Create an exchange with a custom selection policy
    pub fn with_selector(store: Arc<S>, config: ExchangeConfig, selector: Sel) -> AdexResult<Self> {
        config.validate()?;

        Ok(Exchange {
            filter: EligibilityFilter::new(Arc::clone(&store), config.min_credits),
            settlement: SettlementEngine::new(
                Arc::clone(&store),
                config.min_credits,
                config.requester_policy,
                config.retry.clone(),
            ),
            clicks: ClickRecorder::new(Arc::clone(&store)),
            store,
            selector,
            config,
        })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fill one ad slot for `requester`
    pub fn fill(&self, requester: &AppId) -> AdexResult<FillOutcome> {
        self.fill_report(requester).map(|report| report.outcome)
    }

    /// Fill one ad slot, reporting how the request went
    pub fn fill_report(&self, requester: &AppId) -> AdexResult<FillReport> {
        self.fill_inner(requester, None)
    }

    /// Fill one ad slot, giving up with `StoreUnavailable` if `deadline`
    /// passes before settlement commits.
    ///
    /// The deadline is never enforced once a commit has started, so the
    /// error always means nothing was written.
    pub fn fill_report_before(&self, requester: &AppId, deadline: Instant) -> AdexResult<FillReport> {
        self.fill_inner(requester, Some(deadline))
    }

    fn fill_inner(&self, requester: &AppId, deadline: Option<Instant>) -> AdexResult<FillReport> {
        let mut reselections = 0;

        loop {
            // Stage 1: Eligibility snapshot
            let eligibility = self.filter.find_eligible(requester)?;
            ensure_before(deadline, "selection")?;
            if eligibility.requester == RequesterStatus::Unknown {
                tracing::debug!(publisher = %requester, "fill requested by unknown application");
            }

            // Stage 2: Selection
            let Some(choice) = self.selector.select(&eligibility.candidates) else {
                tracing::debug!(
                    publisher = %requester,
                    reselections,
                    "no inventory"
                );
                return Ok(FillReport {
                    outcome: FillOutcome::NoInventory,
                    requester: eligibility.requester,
                    requester_credited: false,
                    reselections,
                });
            };

            // Stage 3: Settlement
            match self.settlement.settle_before(requester, &choice.id, deadline)? {
                Settlement::Settled(receipt) => {
                    return Ok(FillReport {
                        outcome: FillOutcome::Filled(receipt.advertiser.placement()),
                        requester: eligibility.requester,
                        requester_credited: receipt.requester_credited,
                        reselections,
                    });
                }
                Settlement::Stale if reselections < self.config.max_reselections => {
                    reselections += 1;
                    tracing::debug!(
                        publisher = %requester,
                        advertiser = %choice.id,
                        reselections,
                        "selection went stale, taking a fresh snapshot"
                    );
                }
                Settlement::Stale => {
                    tracing::debug!(publisher = %requester, reselections, "reselection budget spent");
                    return Ok(FillReport {
                        outcome: FillOutcome::NoInventory,
                        requester: eligibility.requester,
                        requester_credited: false,
                        reselections,
                    });
                }
            }
        }
    }

    /// Count a click on `app`'s ad; unknown ids are ignored
    pub fn record_click(&self, app: &AppId) -> AdexResult<bool> {
        self.clicks.record_click(app)
    }

    /// Count a click unless `deadline` has already passed
    pub fn record_click_before(&self, app: &AppId, deadline: Instant) -> AdexResult<bool> {
        ensure_before(Some(deadline), "click update")?;
        self.clicks.record_click(app)
    }

    /// Register an application with the initial credit grant
    pub fn register(&self, id: AppId, creative: AdCreative) -> AdexResult<Account> {
        self.register_inner(id, creative, None)
    }

    /// Register unless `deadline` has already passed
    pub fn register_before(
        &self,
        id: AppId,
        creative: AdCreative,
        deadline: Instant,
    ) -> AdexResult<Account> {
        self.register_inner(id, creative, Some(deadline))
    }

    fn register_inner(
        &self,
        id: AppId,
        creative: AdCreative,
        deadline: Option<Instant>,
    ) -> AdexResult<Account> {
        if id.as_str().trim().is_empty() {
            return Err(AdexError::InvalidAppId(id.to_string()));
        }

        ensure_before(deadline, "registration")?;
        let account = Account::new(id, creative, self.config.initial_grant);
        self.store.insert(account.clone())?;
        tracing::info!(app = %account.id, credits = account.credits, "application registered");
        Ok(account)
    }

    /// Look up an account that must exist
    pub fn account(&self, id: &AppId) -> AdexResult<Account> {
        self.store
            .get(id)?
            .ok_or_else(|| AdexError::UnknownAccount(id.clone()))
    }

    /// Sum of all balances in the store
    pub fn ledger_total(&self) -> AdexResult<i64> {
        self.store
            .snapshot()?
            .iter()
            .try_fold(0i64, |total, account| total.checked_add(account.credits))
            .ok_or_else(|| AdexError::Internal("ledger total overflows i64".into()))
    }
}
