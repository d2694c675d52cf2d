use std::time::Duration;

/// Timeouts and backoff parameters for the router (spec.md §5, §4.5).
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub direct_timeout: Duration,
    pub relay_timeout: Duration,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub attempt_ceiling: u32,
    pub drain_batch: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            direct_timeout: Duration::from_secs(3),
            relay_timeout: Duration::from_secs(5),
            backoff_base_ms: 5_000,
            backoff_cap_ms: 300_000,
            attempt_ceiling: 20,
            drain_batch: 16,
        }
    }
}
