//! Cancel scopes.
//!
//! A [`CancelScope`] is a region of a task that can be cancelled as a unit,
//! either explicitly with [`CancelScope::cancel`] or when its deadline expires.
//! Scopes nest: every scope entered by a task is linked under the scope that
//! was innermost at the time, and nurseries link their children under an
//! internal scope of their own. Cancelling a scope therefore reaches every task
//! below it, except through a shielded scope.
//!
//! Cancellation is cooperative. A cancelled task keeps running until its next
//! checkpoint, which fails with [`Cancelled`](crate::Cancelled). The scope that
//! requested the cancellation catches it when its body returns.

pub(crate) mod scope;

pub(crate) mod state;

pub use scope::CancelScope;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a cancel scope.
///
/// Carried by [`Cancelled`](crate::Cancelled) so that only the scope that
/// initiated a cancellation catches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        ScopeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value of this id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}
