//! Log-once bookkeeping.
//!
//! Binding and configuration problems tend to repeat every frame for every
//! affected draw. [`LogOnce`] remembers which causes were already reported so
//! each one reaches the log a single time until [`LogOnce::reset`].

use std::hash::Hash;

use rustc_hash::FxHashSet;

use crate::hash::fx_hash_key;

#[derive(Debug, Default)]
pub struct LogOnce {
    reported: FxHashSet<u64>,
}

impl LogOnce {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `cause` is seen.
    pub fn first<K: Hash>(&mut self, cause: &K) -> bool {
        self.reported.insert(fx_hash_key(cause))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reported.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }

    pub fn reset(&mut self) {
        self.reported.clear();
    }
}

/// Logs a warning once per cause key.
///
/// ```rust,ignore
/// warn_once!(self.log_once, ("missing_defaults", slot), "slot {slot} has no defaults");
/// ```
#[macro_export]
macro_rules! warn_once {
    ($log_once:expr, $cause:expr, $($arg:tt)+) => {
        if $log_once.first(&$cause) {
            $crate::log::warn!($($arg)+);
        }
    };
}
