//! Retry backoff arithmetic. Sleeps are virtual; only the clock moves.

use rand::Rng;

use crate::asl::{JitterStrategy, RetryRule};

/// Delay before the given attempt (0-based):
/// `IntervalSeconds * BackoffRate^attempt`, capped by `MaxDelaySeconds`,
/// optionally fully jittered.
pub(crate) fn delay_seconds(rule: &RetryRule, attempt: u32) -> f64 {
    let mut delay = rule.interval_seconds * rule.backoff_rate.powi(attempt as i32);
    if let Some(cap) = rule.max_delay_seconds {
        delay = delay.min(cap);
    }
    if rule.jitter_strategy == Some(JitterStrategy::Full) {
        delay = rand::rng().random_range(0.0..=delay.max(f64::EPSILON));
    }
    delay
}
