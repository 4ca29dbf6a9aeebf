//! Randomization utilities

use rand::Rng;
use std::time::Duration;

/// Lowest port handed out for local listeners
const PORT_RANGE_START: u16 = 10000;

/// One past the highest port handed out for local listeners
const PORT_RANGE_END: u16 = 60000;

/// Random candidate port for a local listener
pub fn random_port() -> u16 {
    rand::thread_rng().gen_range(PORT_RANGE_START..PORT_RANGE_END)
}

/// Generate random jitter within a range
pub fn jitter(base: Duration, max_jitter: Duration) -> Duration {
    let max_ms = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
    let extra = rand::thread_rng().gen_range(0..=max_ms);
    base + Duration::from_millis(extra)
}

/// Exponential backoff with jitter
pub fn backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.saturating_mul(2_u32.saturating_pow(attempt.min(10)));
    let capped = exp.min(max);
    jitter(capped, capped / 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_port_in_range() {
        for _ in 0..1000 {
            let port = random_port();
            assert!((PORT_RANGE_START..PORT_RANGE_END).contains(&port));
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let max = Duration::from_secs(2);
        let delay = backoff(30, Duration::from_millis(100), max);
        assert!(delay >= max);
        assert!(delay <= max + max / 4);
    }

    #[test]
    fn test_backoff_grows() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(60);
        assert!(backoff(0, base, max) < Duration::from_millis(200));
        assert!(backoff(3, base, max) >= Duration::from_millis(800));
    }
}
