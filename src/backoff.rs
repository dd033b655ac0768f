//! Retry pacing for the merge race.
//!
//! Pure function of the attempt number and a caller-supplied RNG, kept apart
//! from the I/O that decides whether to retry so tests can seed it. Full
//! jitter — uniform in [0, ceiling] — keeps competing processes from
//! retrying in lockstep.

use std::time::Duration;

use rand::prelude::*;

const BASE_MS: u64 = 200;
const CAP_MS: u64 = 3_000;

/// Delay before retry number `attempt` (1-based). The ceiling doubles per
/// attempt from [`BASE_MS`] up to [`CAP_MS`]; the value drawn is uniform
/// below it.
pub fn delay<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    let exponent = attempt.saturating_sub(1).min(6);
    let ceiling = BASE_MS.saturating_mul(1 << exponent).min(CAP_MS);
    Duration::from_millis(rng.random_range(0..=ceiling))
}
