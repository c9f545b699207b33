//! Candidate selection

use rand::seq::SliceRandom;
use rand::Rng;

use adex_core::Account;

/// Picks one advertiser out of an eligibility snapshot.
///
/// Implementations must not mutate anything and must be callable from
/// many threads at once.
pub trait Selector: Send + Sync {
    fn select<'a>(&self, candidates: &'a [Account]) -> Option<&'a Account>;
}

/// Uniformly random member of `candidates`, or `None` if empty.
///
/// Every candidate is equally likely regardless of balance, impressions
/// or any other field.
pub fn select_uniform<'a, R: Rng + ?Sized>(
    candidates: &'a [Account],
    rng: &mut R,
) -> Option<&'a Account> {
    candidates.choose(rng)
}

/// Uniform selection from the calling thread's RNG
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformSelector;

impl Selector for UniformSelector {
    fn select<'a>(&self, candidates: &'a [Account]) -> Option<&'a Account> {
        select_uniform(candidates, &mut rand::thread_rng())
    }
}

impl<T: Selector + ?Sized> Selector for std::sync::Arc<T> {
    fn select<'a>(&self, candidates: &'a [Account]) -> Option<&'a Account> {
        (**self).select(candidates)
    }
}
