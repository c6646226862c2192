use core::fmt::Debug;

/// A memoization key.
///
/// Keys are copied freely by the engine and should be cheap to clone. The
/// two hash functions must be independent of each other: `hash2` drives the
/// double-hashing probe stride of the memo table, and correlated hashes
/// degenerate probing into a linear scan.
///
/// Implementations are provided for the primitive integer types. Composite
/// keys implement the trait directly, deriving the two hashes from their
/// fields (an FNV-style mix for `hash1` and an unrelated mix for `hash2` is
/// the usual pattern).
pub trait Key: Clone + Eq + Debug + Send + Sync {
    /// Primary hash; selects the probe start position.
    fn hash1(&self) -> u64;
    /// Secondary hash; selects the probe stride. Must be independent from
    /// [`Key::hash1`].
    fn hash2(&self) -> u64;
}

/// A memoized value.
///
/// The engine treats values as opaque payloads; `Default` supplies the
/// sentinel handed out during dry-run prerequisite discovery.
pub trait Value: Clone + Default + Send + Sync {}

impl<T: Clone + Default + Send + Sync> Value for T {}

/// `splitmix64` finalizer.
#[inline]
const fn mix1(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// Murmur3 `fmix64` finalizer; constants unrelated to [`mix1`] keep the two
/// hash streams independent.
#[inline]
const fn mix2(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^ (x >> 33)
}

macro_rules! impl_key_for_int {
    ($($int:ty),* $(,)?) => {
        $(
            impl Key for $int {
                #[inline]
                fn hash1(&self) -> u64 {
                    mix1(*self as u64)
                }

                #[inline]
                fn hash2(&self) -> u64 {
                    mix2(*self as u64)
                }
            }
        )*
    };
}

impl_key_for_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_deterministic() {
        for key in [0_u64, 1, 42, u64::MAX] {
            assert_eq!(key.hash1(), key.hash1());
            assert_eq!(key.hash2(), key.hash2());
        }
    }

    #[test]
    fn hash_streams_differ() {
        // The two mixers must not shadow each other, or double hashing
        // collapses.
        let disagreements = (1_u64..=1000)
            .filter(|key| key.hash1() != key.hash2())
            .count();
        assert_eq!(disagreements, 1000);
    }

    #[test]
    fn nearby_keys_spread() {
        let mut seen = std::collections::HashSet::new();
        for key in 0_u64..1000 {
            assert!(seen.insert(key.hash1()));
        }
    }
}
