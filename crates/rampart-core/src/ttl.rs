//! TTL defaults and expiry jitter.

use std::time::Duration;

use rand::Rng;

/// Default TTL for cached values.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// TTL for the null marker. Short, so a key that starts existing is
/// picked up quickly.
pub const NULL_TTL: Duration = Duration::from_secs(60);

/// Default lock lease.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Lifetime of a remote filter key, refreshed on every add.
pub const FILTER_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default jitter ratio applied to loaded values.
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

/// Returns `base` plus a random offset in `[0, base * ratio]`, truncated
/// to whole seconds.
///
/// Stores expire keys at second granularity, so the offset is floored:
/// the TTL a store actually applies never exceeds `base * (1 + ratio)`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rampart_core::ttl::jittered;
///
/// let base = Duration::from_secs(300);
/// let ttl = jittered(base, 0.1);
/// assert!(ttl >= base && ttl <= Duration::from_secs(330));
/// ```
pub fn jittered(base: Duration, ratio: f64) -> Duration {
    jittered_with(base, ratio, &mut rand::thread_rng())
}

/// Same as [`jittered`] with an explicit random source.
pub fn jittered_with<R: Rng>(base: Duration, ratio: f64, rng: &mut R) -> Duration {
    if base.is_zero() || ratio <= 0.0 {
        return base;
    }
    let factor = rng.gen_range(0.0..=ratio);
    base + Duration::from_secs(base.mul_f64(factor).as_secs())
}

/// Whole seconds for a store TTL, rounding sub-second remainders up.
///
/// Zero stays zero (no expiry).
pub fn whole_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs }
}
