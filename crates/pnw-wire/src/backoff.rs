//! Reconnect backoff, matching upstream's `Connection._get_wait_time`
//! (asyncpusher/connection.py): `round(random() * (2^n - 1)) + 1`, capped.

use rand::Rng;

pub const MAX_WAIT_SECONDS: u64 = 120;

pub fn wait_seconds(num_attempts: u32) -> u64 {
    if num_attempts == 0 {
        return 0;
    }
    let span = (2u64.saturating_pow(num_attempts).saturating_sub(1)) as f64;
    let sample: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let seconds = (sample * span).round() as u64 + 1;
    seconds.min(MAX_WAIT_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attempts_has_no_wait() {
        assert_eq!(wait_seconds(0), 0);
    }

    #[test]
    fn wait_is_capped_at_120_seconds() {
        for attempts in 1..20 {
            assert!(wait_seconds(attempts) <= MAX_WAIT_SECONDS);
            assert!(wait_seconds(attempts) >= 1);
        }
    }
}
