//! Exponential back-off for reconnect attempts:
//! `d_{n+1} = min(2*d_n, 3600s)` with `d_1 = 1s`.

use std::time::Duration;

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);

/// The delay to use for the *next* attempt, given the delay used for the
/// attempt that just failed (`Duration::ZERO` for "no attempt has failed
/// yet", which yields `INITIAL_BACKOFF`).
pub fn next_backoff(previous: Duration) -> Duration {
    if previous.is_zero() {
        INITIAL_BACKOFF
    } else {
        (previous * 2).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_clamps_at_one_hour() {
        let mut d = Duration::ZERO;
        let mut seen = Vec::new();
        for _ in 0..14 {
            d = next_backoff(d);
            seen.push(d);
        }
        assert_eq!(seen[0], Duration::from_secs(1));
        assert_eq!(seen[1], Duration::from_secs(2));
        assert_eq!(seen[2], Duration::from_secs(4));
        assert_eq!(seen[11], Duration::from_secs(2048));
        assert_eq!(seen[12], MAX_BACKOFF);
        assert_eq!(seen[13], MAX_BACKOFF);
    }
}
