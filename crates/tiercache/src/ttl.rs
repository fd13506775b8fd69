//! TTL jitter.

use std::time::Duration;

use rand::Rng;

/// Lower bound for a jittered TTL.
pub const MIN_JITTERED_TTL: Duration = Duration::from_secs(1);

/// Perturb `ttl` by a uniform factor in `[-fraction, +fraction]`.
///
/// A non-positive fraction returns `ttl` untouched. Otherwise the result is
/// never below [`MIN_JITTERED_TTL`].
pub fn apply_jitter(ttl: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 {
        return ttl;
    }
    let fraction = fraction.min(1.0);
    let delta = rand::thread_rng().gen_range(-fraction..=fraction);
    let adjusted = ttl.as_secs_f64() * (1.0 + delta);
    Duration::try_from_secs_f64(adjusted.max(MIN_JITTERED_TTL.as_secs_f64()))
        .unwrap_or(Duration::MAX)
}
