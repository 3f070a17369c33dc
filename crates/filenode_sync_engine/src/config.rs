//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

/// Default minimum interval between admitted sync runs.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Default number of retries after the first download attempt.
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// Default timeout for inventory requests.
pub const DEFAULT_INVENTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for file transfers.
pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory this node owns and serves.
    pub root: PathBuf,
    /// Node identity sent to the central service.
    pub node_id: String,
    /// Base URL of the central service.
    pub api_url: String,
    /// Minimum interval between the starts of two runs.
    pub cooldown: Duration,
    /// Per-file retry behavior.
    pub retry: RetryConfig,
    /// Timeout for inventory requests. Kept short; only metadata travels.
    pub inventory_timeout: Duration,
    /// Timeout for a single file transfer.
    pub file_timeout: Duration,
    /// Maximum number of concurrent hashing or download tasks.
    pub concurrency: usize,
    /// Fixed overall deadline for the download phase, replacing the derived one.
    pub run_deadline: Option<Duration>,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(
        root: impl Into<PathBuf>,
        node_id: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            node_id: node_id.into(),
            api_url: api_url.into(),
            cooldown: DEFAULT_COOLDOWN,
            retry: RetryConfig::default(),
            inventory_timeout: DEFAULT_INVENTORY_TIMEOUT,
            file_timeout: DEFAULT_FILE_TIMEOUT,
            concurrency: default_concurrency(),
            run_deadline: None,
        }
    }

    /// Sets the cooldown between runs.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the inventory and file transfer timeouts.
    pub fn with_timeouts(mut self, inventory: Duration, file: Duration) -> Self {
        self.inventory_timeout = inventory;
        self.file_timeout = file;
        self
    }

    /// Caps the number of concurrent tasks.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets a fixed deadline for the download phase.
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(SyncError::Config("node id must not be empty".into()));
        }
        if self.concurrency == 0 {
            return Err(SyncError::Config("concurrency must be at least 1".into()));
        }
        if self.inventory_timeout.is_zero() || self.file_timeout.is_zero() {
            return Err(SyncError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// Upper bound on the download phase for `task_count` tasks.
    ///
    /// Every task may use all of its attempts at the full transfer timeout
    /// plus the longest jittered backoff between them, and tasks run in waves
    /// of `concurrency`.
    pub fn run_deadline_for(&self, task_count: usize) -> Duration {
        if let Some(deadline) = self.run_deadline {
            return deadline;
        }
        let waves = task_count.div_ceil(self.concurrency.max(1)).max(1) as u32;
        let per_task = self.file_timeout.saturating_mul(self.retry.attempts())
            + self.retry.max_jittered_delay().saturating_mul(self.retry.max_retries);
        per_task.saturating_mul(waves)
    }
}

/// One worker per available CPU.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Configuration for per-file retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; a task gets `max_retries + 1` attempts.
    pub max_retries: u32,
    /// Delay before the first retry. Zero disables backoff.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration that retries immediately, `max_retries` times.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Enables exponential backoff with jitter between retries.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self.add_jitter = true;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Total attempts per task.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Longest delay `delay_for_attempt` can return.
    pub fn max_jittered_delay(&self) -> Duration {
        if self.initial_delay.is_zero() {
            Duration::ZERO
        } else if self.add_jitter {
            self.max_delay.saturating_mul(5) / 4
        } else {
            self.max_delay
        }
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% jitter
            let jitter = delay_secs * rand::thread_rng().gen_range(0.0..0.25);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY)
    }
}
