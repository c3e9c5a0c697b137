use std::time::Duration;

/// Options used when opening the read-only query store.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Number of pooled read-only connections.
    pub pool_size: usize,
    /// Wall-clock budget for each plan, count query included.
    pub timeout: Duration,
    /// Virtual machine instructions between deadline checks.
    pub progress_interval: i32,
    /// How long a connection waits on a locked database file.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            timeout: Duration::from_secs(60),
            progress_interval: 1_000,
            busy_timeout: Duration::from_secs(5),
        }
    }
}
