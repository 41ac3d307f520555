use std::time::Duration;

use rand::Rng;

const BASE_DELAY_MS: f64 = 1000.0;
const MAX_DELAY_MS: f64 = 30_000.0;
const JITTER: f64 = 0.25;

/// Delay before reconnect attempt number `attempts` (zero based),
/// exponential from 1s capped at 30s, then scaled by a random factor in [0.75, 1.25].
pub(crate) fn reconnect_delay(attempts: u32) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0 - JITTER..=1.0 + JITTER);
    jittered_delay(attempts, factor)
}

fn jittered_delay(attempts: u32, factor: f64) -> Duration {
    let base = BASE_DELAY_MS * 2f64.powi(attempts.min(16) as i32);
    Duration::from_secs_f64(base.min(MAX_DELAY_MS) * factor / 1000.0)
}
