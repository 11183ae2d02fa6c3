//! Coalescing reload coordinator with bounded retry.

use super::{ChannelError, ControlChannel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Default retry configuration
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How long a control channel ping answers health checks.
pub const DEFAULT_HEALTH_TTL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy)]
struct HealthCheck {
    healthy: bool,
    expires_at: Instant,
}

/// Exponential backoff for transient reload failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Triggers module reloads on the telephony server.
///
/// Callers take a ticket once their configuration write is durable. Reloads
/// run one at a time; before each one the coordinator notes the newest
/// ticket, and a successful reload covers every ticket up to that mark.
/// A caller whose ticket is already covered returns without reloading again,
/// so a burst of registrations costs one or two reloads instead of one each.
pub struct ReloadCoordinator {
    channel: Arc<dyn ControlChannel>,
    module: String,
    retry: RetryPolicy,
    issued: AtomicU64,
    covered: Mutex<u64>,
    reloads: AtomicU64,
    health: Mutex<Option<HealthCheck>>,
    health_ttl: Duration,
}

impl ReloadCoordinator {
    pub fn new(channel: Arc<dyn ControlChannel>, module: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            channel,
            module: module.into(),
            retry,
            issued: AtomicU64::new(0),
            covered: Mutex::new(0),
            reloads: AtomicU64::new(0),
            health: Mutex::new(None),
            health_ttl: DEFAULT_HEALTH_TTL,
        }
    }

    /// Reuse a ping result for `ttl` before asking the channel again.
    pub fn with_health_ttl(mut self, ttl: Duration) -> Self {
        self.health_ttl = ttl;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Number of reloads that completed successfully.
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Whether the control channel answered recently.
    ///
    /// Ping results are cached for the health TTL and concurrent callers share
    /// a single ping. Reload outcomes refresh the cache too.
    pub async fn channel_healthy(&self) -> bool {
        let mut last = self.health.lock().await;
        if let Some(cached) = *last {
            if cached.expires_at > Instant::now() {
                return cached.healthy;
            }
        }

        let healthy = self.channel.ping().await;
        *last = Some(self.health_check(healthy));
        healthy
    }

    fn health_check(&self, healthy: bool) -> HealthCheck {
        HealthCheck {
            healthy,
            expires_at: Instant::now() + self.health_ttl,
        }
    }

    /// No-op while a ping holds the cache.
    fn record_health(&self, healthy: bool) {
        if let Ok(mut last) = self.health.try_lock() {
            *last = Some(self.health_check(healthy));
        }
    }

    /// Make every configuration write that finished before this call live.
    ///
    /// Returns only after a reload that started after the call began has
    /// completed.
    #[instrument(skip(self), fields(module = %self.module))]
    pub async fn activate(&self) -> Result<(), ChannelError> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        let mut covered = self.covered.lock().await;
        if *covered >= ticket {
            debug!(ticket, covered = *covered, "Reload already covered by a newer one");
            return Ok(());
        }

        let mark = self.issued.load(Ordering::SeqCst);
        match self.reload_with_retry().await {
            Ok(()) => self.record_health(true),
            Err(e) => {
                if matches!(e, ChannelError::Unavailable(_)) {
                    self.record_health(false);
                }
                return Err(e);
            }
        }
        *covered = mark;
        self.reloads.fetch_add(1, Ordering::SeqCst);

        info!(ticket, mark, "Module reloaded");
        Ok(())
    }

    /// Retries on `Unavailable` up to the policy limit; `Rejected` is final.
    async fn reload_with_retry(&self) -> Result<(), ChannelError> {
        let mut backoff = self.retry.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} after {:?} backoff", attempt, backoff);
                sleep(backoff).await;
                // Exponential backoff with cap
                backoff = (backoff * 2).min(self.retry.max_backoff);
            }

            match self.channel.reload(&self.module).await {
                Ok(()) => return Ok(()),
                Err(e @ ChannelError::Rejected(_)) => {
                    warn!("Reload rejected: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Reload failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ChannelError::Unavailable("Max retries exceeded".into())))
    }
}
