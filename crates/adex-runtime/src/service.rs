//! Async exchange service

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;

use adex_core::{Account, AdCreative, AdexError, AdexResult, AppId, FillOutcome};
use adex_exchange::{Exchange, RequesterStatus, Selector, UniformSelector};
use adex_store::{AccountStore, MemoryStore};

use crate::{load_seed, ClickAck, FillResponse, RuntimeConfig};

/// Point-in-time service counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub fills: u64,
    pub no_inventory: u64,
    pub unknown_requesters: u64,
    pub reselections: u64,
    pub failures: u64,
    pub clicks_acknowledged: u64,
    pub clicks_counted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fills: AtomicU64,
    no_inventory: AtomicU64,
    unknown_requesters: AtomicU64,
    reselections: AtomicU64,
    failures: AtomicU64,
    clicks_acknowledged: AtomicU64,
    clicks_counted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ServiceStats {
        ServiceStats {
            fills: self.fills.load(Ordering::Relaxed),
            no_inventory: self.no_inventory.load(Ordering::Relaxed),
            unknown_requesters: self.unknown_requesters.load(Ordering::Relaxed),
            reselections: self.reselections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            clicks_acknowledged: self.clicks_acknowledged.load(Ordering::Relaxed),
            clicks_counted: self.clicks_counted.load(Ordering::Relaxed),
        }
    }
}

/// Async front of the allocator.
///
/// The allocator and its store are synchronous; each call runs on the
/// blocking pool, at most `max_in_flight` at a time. Each task holds its
/// permit until it returns, even if its caller has given up on it.
///
/// Reads are abandoned after `request_timeout`. Writes get the same
/// deadline but only before they commit; a write that has started is
/// awaited, so a timeout error always means nothing changed.
pub struct ExchangeService<S, Sel = UniformSelector> {
    exchange: Arc<Exchange<S, Sel>>,
    permits: Arc<Semaphore>,
    request_timeout: Duration,
    counters: Arc<Counters>,
}

impl<S, Sel> Clone for ExchangeService<S, Sel> {
    fn clone(&self) -> Self {
        ExchangeService {
            exchange: Arc::clone(&self.exchange),
            permits: Arc::clone(&self.permits),
            request_timeout: self.request_timeout,
            counters: Arc::clone(&self.counters),
        }
    }
}

impl ExchangeService<MemoryStore> {
    /// Build a service over an in-memory ledger, seeded if configured
    pub fn from_config(config: &RuntimeConfig) -> AdexResult<Self> {
        config.validate()?;
        let store = match &config.seed_path {
            Some(path) => load_seed(path)?,
            None => MemoryStore::new(),
        };
        let exchange = Exchange::new(Arc::new(store), config.exchange.clone())?;
        Ok(Self::new(exchange, config))
    }
}

impl<S, Sel> ExchangeService<S, Sel>
where
    S: AccountStore + 'static,
    Sel: Selector + 'static,
{
    pub fn new(exchange: Exchange<S, Sel>, config: &RuntimeConfig) -> Self {
        ExchangeService {
            exchange: Arc::new(exchange),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            request_timeout: config.request_timeout,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn exchange(&self) -> &Arc<Exchange<S, Sel>> {
        &self.exchange
    }

    pub fn stats(&self) -> ServiceStats {
        self.counters.snapshot()
    }

    /// Blocking tasks that could start right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fill an ad slot for the application identified by `requester`
    pub async fn fill(&self, requester: &str) -> AdexResult<FillResponse> {
        let requester = parse_id(requester)?;
        let result = self
            .run_write(move |exchange, deadline| exchange.fill_report_before(&requester, deadline))
            .await;

        match result {
            Ok(report) => {
                let counters = &self.counters;
                Counters::bump(&counters.reselections, u64::from(report.reselections));
                if report.requester == RequesterStatus::Unknown {
                    Counters::bump(&counters.unknown_requesters, 1);
                }
                match report.outcome {
                    FillOutcome::Filled(_) => Counters::bump(&counters.fills, 1),
                    FillOutcome::NoInventory => Counters::bump(&counters.no_inventory, 1),
                }
                Ok(report.outcome.into())
            }
            Err(err) => {
                Counters::bump(&self.counters.failures, 1);
                tracing::warn!(error = %err, retryable = err.is_retryable(), "fill request failed");
                Err(err)
            }
        }
    }

    /// Record a click on `app`'s ad. Always acknowledged.
    pub async fn report_click(&self, app: &str) -> ClickAck {
        Counters::bump(&self.counters.clicks_acknowledged, 1);

        let Ok(app) = parse_id(app) else {
            tracing::debug!("click report without an application id");
            return ClickAck::Ok;
        };

        let recorded = self
            .run_write(move |exchange, deadline| exchange.record_click_before(&app, deadline))
            .await;
        match recorded {
            Ok(true) => Counters::bump(&self.counters.clicks_counted, 1),
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "click could not be recorded"),
        }
        ClickAck::Ok
    }

    /// Register a new application with the initial credit grant
    pub async fn register(&self, app: &str, creative: AdCreative) -> AdexResult<Account> {
        let app = parse_id(app)?;
        self.run_write(move |exchange, deadline| exchange.register_before(app, creative, deadline))
            .await
    }

    /// Current state of one account
    pub async fn account(&self, app: &str) -> AdexResult<Account> {
        let app = parse_id(app)?;
        self.run_read(move |exchange| exchange.account(&app)).await
    }

    /// Sum of all balances
    pub async fn ledger_total(&self) -> AdexResult<i64> {
        self.run_read(|exchange| exchange.ledger_total()).await
    }

    /// Run a write to completion.
    ///
    /// The exchange is handed the request deadline and refuses to start
    /// writing once it has passed.
    async fn run_write<T, F>(&self, f: F) -> AdexResult<T>
    where
        F: FnOnce(&Exchange<S, Sel>, Instant) -> AdexResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = Instant::now() + self.request_timeout;
        self.run_blocking(move |exchange| f(exchange, deadline)).await
    }

    /// Run a read, abandoning it after `request_timeout`
    async fn run_read<T, F>(&self, f: F) -> AdexResult<T>
    where
        F: FnOnce(&Exchange<S, Sel>) -> AdexResult<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.request_timeout, self.run_blocking(f)).await {
            Ok(result) => result,
            Err(_) => Err(AdexError::StoreUnavailable(format!(
                "request exceeded {}",
                humantime::format_duration(self.request_timeout)
            ))),
        }
    }

    async fn run_blocking<T, F>(&self, f: F) -> AdexResult<T>
    where
        F: FnOnce(&Exchange<S, Sel>) -> AdexResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AdexError::Internal("service is shutting down".into()))?;

        let exchange = Arc::clone(&self.exchange);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&exchange)
        });

        task.await
            .map_err(|join| AdexError::Internal(format!("exchange task failed: {join}")))?
    }
}

fn parse_id(raw: &str) -> AdexResult<AppId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AdexError::InvalidAppId(raw.to_string()));
    }
    Ok(AppId::new(trimmed))
}
