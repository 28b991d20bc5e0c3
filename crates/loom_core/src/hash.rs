//! Hash helpers shared by the pipeline cache and the submesh sort keys.

use std::hash::{Hash, Hasher};

/// Mixes `value` into `seed`.
///
/// 64-bit variant of the classic `hash_combine` (golden-ratio constant plus
/// shifts). Pure and order dependent: `combine(combine(s, a), b)` differs from
/// `combine(combine(s, b), a)` for almost all inputs.
#[inline]
#[must_use]
pub const fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ (value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2))
}

/// Compute a `u64` hash of any `Hash`-able value using `FxHasher`.
#[inline]
pub fn fx_hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_deterministic() {
        assert_eq!(hash_combine(7, 11), hash_combine(7, 11));
    }

    #[test]
    fn combine_is_order_dependent() {
        let ab = hash_combine(hash_combine(0, 1), 2);
        let ba = hash_combine(hash_combine(0, 2), 1);
        assert_ne!(ab, ba);
    }

    #[test]
    fn combine_distinguishes_values() {
        assert_ne!(hash_combine(42, 0), hash_combine(42, 1));
    }

    #[test]
    fn fx_hash_matches_for_equal_keys() {
        assert_eq!(fx_hash_key(&(1u32, 2u64)), fx_hash_key(&(1u32, 2u64)));
        assert_ne!(fx_hash_key(&(1u32, 2u64)), fx_hash_key(&(2u32, 1u64)));
    }
}
