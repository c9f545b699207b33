//! Fill outcomes

use serde::{Deserialize, Serialize};

use crate::AppId;

/// Everything the request layer needs to render a selected ad
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPlacement {
    pub app_id: AppId,
    pub icon_url: String,
    pub link: String,
    pub text: String,
}

/// Result of an ad-fill request.
///
/// `NoInventory` is a valid terminal outcome, not a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FillOutcome {
    Filled(AdPlacement),
    NoInventory,
}

impl FillOutcome {
    #[inline]
    pub fn is_filled(&self) -> bool {
        matches!(self, FillOutcome::Filled(_))
    }

    pub fn placement(&self) -> Option<&AdPlacement> {
        match self {
            FillOutcome::Filled(placement) => Some(placement),
            FillOutcome::NoInventory => None,
        }
    }
}
