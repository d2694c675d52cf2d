//! Pure backoff arithmetic for the outbox retry schedule (spec.md §4.5, §8
//! invariant 8). No I/O, no clock access — callers supply `now`.

/// `next_try_at = now + min(cap, base * 2^attempts)`.
pub fn next_try_at(now: u64, attempts: u32, base_ms: u64, cap_ms: u64) -> u64 {
    let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
    let delay = base_ms.saturating_mul(factor).min(cap_ms);
    now.saturating_add(delay)
}

/// Whether `attempts` (after this failure is recorded) has reached the
/// ceiling and the entry should transition to FAILED instead of being
/// rescheduled.
pub fn ceiling_reached(attempts: u32, ceiling: u32) -> bool {
    attempts >= ceiling
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_cap() {
        let now = 1_000;
        assert_eq!(next_try_at(now, 0, 5_000, 300_000), now + 5_000);
        assert_eq!(next_try_at(now, 1, 5_000, 300_000), now + 10_000);
        assert_eq!(next_try_at(now, 2, 5_000, 300_000), now + 20_000);
    }

    #[test]
    fn delay_is_capped() {
        let now = 0;
        assert_eq!(next_try_at(now, 20, 5_000, 300_000), 300_000);
    }

    #[test]
    fn monotonicity_invariant_holds() {
        // invariant 8: after N consecutive failures, next_try_at - now >=
        // min(cap, base * 2^(N-1)).
        let base = 5_000;
        let cap = 300_000;
        for n in 1..30u32 {
            let attempts_before_this_failure = n - 1;
            let now = 10_000;
            let scheduled = next_try_at(now, attempts_before_this_failure, base, cap);
            let lower_bound = base.saturating_mul(1u64.checked_shl(n - 1).unwrap_or(u64::MAX)).min(cap);
            assert!(scheduled - now >= lower_bound);
        }
    }

    #[test]
    fn ceiling_reached_at_exact_boundary() {
        assert!(!ceiling_reached(19, 20));
        assert!(ceiling_reached(20, 20));
        assert!(ceiling_reached(21, 20));
    }
}
