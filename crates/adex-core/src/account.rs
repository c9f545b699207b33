//! Application accounts - the credit ledger entries of the exchange

use serde::{Deserialize, Serialize};

use crate::{AdPlacement, AppId};

/// Ad creative shown when the account is selected as advertiser.
///
/// Supplied by the account-management layer; the exchange never
/// transforms these fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCreative {
    /// Location of the display asset (icon)
    pub icon_url: String,
    /// Destination link opened on click
    pub link: String,
    /// Ad text
    pub text: String,
}

impl AdCreative {
    pub fn new(icon_url: impl Into<String>, link: impl Into<String>, text: impl Into<String>) -> Self {
        AdCreative {
            icon_url: icon_url.into(),
            link: link.into(),
            text: text.into(),
        }
    }
}

/// One registered application's balance and usage counters.
///
/// `credits` is signed: book-keeping never requires it to stay
/// non-negative, but an account with `credits < min_credits` is never
/// selected as advertiser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AppId,
    pub credits: i64,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub creative: AdCreative,
    /// Optimistic-concurrency stamp, bumped on every credit or impression write
    #[serde(default)]
    pub version: u64,
}

impl Account {
    pub fn new(id: impl Into<AppId>, creative: AdCreative, credits: i64) -> Self {
        Account {
            id: id.into(),
            credits,
            impressions: 0,
            clicks: 0,
            creative,
            version: 0,
        }
    }

    /// Whether this account can currently pay for an impression
    #[inline]
    pub fn is_eligible(&self, min_credits: i64) -> bool {
        self.credits >= min_credits
    }

    /// Whether this account may be shown to `requester`
    #[inline]
    pub fn is_candidate_for(&self, requester: &AppId, min_credits: i64) -> bool {
        &self.id != requester && self.is_eligible(min_credits)
    }

    /// Public fields needed to render this account's ad
    pub fn placement(&self) -> AdPlacement {
        AdPlacement {
            app_id: self.id.clone(),
            icon_url: self.creative.icon_url.clone(),
            link: self.creative.link.clone(),
            text: self.creative.text.clone(),
        }
    }
}
