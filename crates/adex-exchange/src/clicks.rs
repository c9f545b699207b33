//! Click recorder

use std::sync::Arc;

use adex_core::{AdexResult, AppId};
use adex_store::{AccountStore, WriteOutcome};

/// Counts clicks on an advertiser's ad. Never touches credits.
pub struct ClickRecorder<S> {
    store: Arc<S>,
}

impl<S: AccountStore> ClickRecorder<S> {
    pub fn new(store: Arc<S>) -> Self {
        ClickRecorder { store }
    }

    /// Returns whether a click was counted. An unknown id is a no-op,
    /// only an unreachable store is an error.
    pub fn record_click(&self, app: &AppId) -> AdexResult<bool> {
        match self.store.increment_clicks(app)? {
            WriteOutcome::Applied => Ok(true),
            WriteOutcome::NotFound | WriteOutcome::Conflict => {
                tracing::debug!(app = %app, "click for unknown application ignored");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, ledger};

    #[test]
    fn test_click_counts_without_touching_credits() {
        let store = ledger(&[("A", 7)]);
        let recorder = ClickRecorder::new(Arc::clone(&store));

        assert!(recorder.record_click(&AppId::new("A")).unwrap());
        assert!(recorder.record_click(&AppId::new("A")).unwrap());

        let a = account(&store, "A");
        assert_eq!(a.clicks, 2);
        assert_eq!(a.credits, 7);
        assert_eq!(a.impressions, 0);
    }

    #[test]
    fn test_click_on_unknown_id_is_a_quiet_no_op() {
        let store = ledger(&[("A", 7)]);
        let before = store.snapshot().unwrap();
        let recorder = ClickRecorder::new(Arc::clone(&store));

        assert!(!recorder.record_click(&AppId::new("nonexistent")).unwrap());
        assert_eq!(store.snapshot().unwrap(), before);
    }
}
