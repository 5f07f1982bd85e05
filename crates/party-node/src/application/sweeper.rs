//! TimeoutSweeper: expires queries that never received a reply.
//!
//! Runs on its own periodic task for the lifetime of the service.  Each tick
//! moves every query older than the timeout out of the registry and then, with
//! the registry lock already released, completes each one with a failure.
//! The fixed timeout bounds both registry growth and how long a caller waits
//! to hear that a host is unreachable.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::query_registry::QueryRegistry;

/// Age at which a pending query is abandoned.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct TimeoutSweeper {
    registry: Arc<QueryRegistry>,
    timeout: Duration,
    period: Duration,
}

impl TimeoutSweeper {
    pub fn new(registry: Arc<QueryRegistry>, timeout: Duration, period: Duration) -> Self {
        Self {
            registry,
            timeout,
            period,
        }
    }

    /// Expires every query at least `timeout` old at `now` and reports each
    /// one to its callback as a failure.  Returns the number expired.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired = self.registry.sweep_expired(now, self.timeout);
        let count = expired.len();

        for query in expired {
            debug!(host = %query.host, challenge = %query.challenge, "query timed out");
            query.fail();
        }

        count
    }

    /// Spawns the periodic sweep task.
    ///
    /// The task stops at the first tick after `running` is cleared.
    pub fn spawn(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                timeout_ms = self.timeout.as_millis() as u64,
                period_ms = self.period.as_millis() as u64,
                "query sweeper started"
            );

            loop {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                self.sweep(Instant::now());
            }

            info!("query sweeper stopped");
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use party_core::InfoString;

    use crate::application::query_registry::QueryCallback;

    fn host() -> SocketAddr {
        SocketAddr::from(([172, 16, 0, 9], 28960))
    }

    fn recording(log: &Arc<Mutex<Vec<(bool, SocketAddr, InfoString)>>>) -> QueryCallback {
        let log = Arc::clone(log);
        Box::new(move |success, host, info| log.lock().unwrap().push((success, host, info)))
    }

    #[test]
    fn test_sweep_fails_expired_queries_with_empty_record() {
        // Arrange
        let registry = Arc::new(QueryRegistry::default());
        let sweeper = TimeoutSweeper::new(
            Arc::clone(&registry),
            DEFAULT_QUERY_TIMEOUT,
            DEFAULT_SWEEP_INTERVAL,
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let t0 = Instant::now();
        registry.register_at(host(), recording(&log), t0).unwrap();

        // Act
        let early = sweeper.sweep(t0 + Duration::from_secs(9));
        let late = sweeper.sweep(t0 + Duration::from_secs(10));

        // Assert
        assert_eq!(early, 0);
        assert_eq!(late, 1);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        let (success, reported_host, info) = &log[0];
        assert!(!success);
        assert_eq!(*reported_host, host());
        assert!(info.is_empty());
    }

    #[test]
    fn test_callback_may_reenter_registry() {
        // Arrange – the callback issues a follow-up registration
        let registry = Arc::new(QueryRegistry::default());
        let sweeper = TimeoutSweeper::new(
            Arc::clone(&registry),
            DEFAULT_QUERY_TIMEOUT,
            DEFAULT_SWEEP_INTERVAL,
        );
        let inner = Arc::clone(&registry);
        let t0 = Instant::now();
        registry
            .register_at(
                host(),
                Box::new(move |_, host, _| {
                    inner.register(host, Box::new(|_, _, _| {})).unwrap();
                }),
                t0,
            )
            .unwrap();

        // Act – would deadlock if the lock were held during the callback
        sweeper.sweep(t0 + Duration::from_secs(11));

        // Assert
        assert_eq!(registry.len(), 1, "the follow-up query must be pending");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_expires_query_after_timeout() {
        // Arrange
        let registry = Arc::new(QueryRegistry::default());
        let failures = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&failures);
        registry
            .register(
                host(),
                Box::new(move |success, _, _| {
                    assert!(!success);
                    f.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let handle = TimeoutSweeper::new(
            Arc::clone(&registry),
            DEFAULT_QUERY_TIMEOUT,
            DEFAULT_SWEEP_INTERVAL,
        )
        .spawn(Arc::clone(&running));

        // Act / Assert – still pending shortly before the timeout
        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);

        // Act / Assert – expired within one sweep period of the timeout
        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());

        running.store(false, Ordering::Relaxed);
        tokio::time::sleep(DEFAULT_SWEEP_INTERVAL).await;
        assert!(handle.is_finished());
    }
}
