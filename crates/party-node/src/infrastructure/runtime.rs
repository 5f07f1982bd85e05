//! PartyService: the owned context that wires one node together.
//!
//! # Architecture
//!
//! ```text
//! PartyService::start()
//!  ├─ receive pump   (router task)   inbound datagrams → DiscoveryHandler
//!  ├─ sweeper        (interval task) expired queries   → callback(false)
//!  └─ main loop      (orchestrator)  MainTask queue    → HostSession
//! ```
//!
//! Everything is created here and torn down by [`PartyService::shutdown`].
//! There is no process-wide state, so several nodes can run side by side in
//! one process (the integration tests and the demo binary rely on this).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::application::discovery::{DiscoveryHandler, HostInfo, Transport};
use crate::application::join::{
    HostSession, JoinEvent, JoinId, JoinOrchestrator, MainQueue, MainTask,
    DEFAULT_MODE_SWITCH_DELAY,
};
use crate::application::query_registry::{QueryCallback, QueryRegistry, DEFAULT_CAPACITY};
use crate::application::sweeper::{TimeoutSweeper, DEFAULT_QUERY_TIMEOUT, DEFAULT_SWEEP_INTERVAL};
use crate::infrastructure::network::loopback::Datagram;
use crate::infrastructure::network::router::MessageRouter;
use crate::infrastructure::storage::config::NodeConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("party service is not running")]
    NotRunning,
}

/// Timing and sizing knobs for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub query_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_pending_queries: usize,
    pub mode_switch_delay: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_pending_queries: DEFAULT_CAPACITY,
            mode_switch_delay: DEFAULT_MODE_SWITCH_DELAY,
        }
    }
}

impl From<&NodeConfig> for ServiceSettings {
    fn from(cfg: &NodeConfig) -> Self {
        Self {
            query_timeout: cfg.discovery.query_timeout(),
            sweep_interval: cfg.discovery.sweep_interval(),
            max_pending_queries: cfg.discovery.max_pending_queries,
            mode_switch_delay: cfg.join.mode_switch_delay(),
        }
    }
}

pub struct PartyService {
    discovery: Arc<DiscoveryHandler>,
    queue: MainQueue,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PartyService {
    /// Starts a node on `transport`/`inbox`, backed by `host`.
    ///
    /// `host` is cloned: one handle answers `getInfo` from the receive task,
    /// the other is owned by the main loop.  Returns the service and the
    /// stream of terminal join outcomes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H>(
        settings: &ServiceSettings,
        transport: Arc<dyn Transport>,
        inbox: mpsc::UnboundedReceiver<Datagram>,
        host: H,
    ) -> (Self, mpsc::UnboundedReceiver<JoinEvent>)
    where
        H: HostInfo + HostSession + Clone + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let registry = Arc::new(QueryRegistry::new(settings.max_pending_queries));
        let discovery = Arc::new(DiscoveryHandler::new(
            Arc::clone(&registry),
            transport,
            Arc::new(host.clone()),
        ));

        let pump = MessageRouter::for_discovery(Arc::clone(&discovery))
            .spawn(inbox, Arc::clone(&running));

        let sweeper = TimeoutSweeper::new(
            Arc::clone(&registry),
            settings.query_timeout,
            settings.sweep_interval,
        )
        .spawn(Arc::clone(&running));

        let (queue, tasks) = MainQueue::channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let orchestrator = JoinOrchestrator::new(
            Arc::clone(&discovery),
            Box::new(host),
            &queue,
            events_tx,
            settings.mode_switch_delay,
        );
        let main_loop = tokio::spawn(orchestrator.run(tasks));

        info!(
            max_pending_queries = registry.capacity(),
            "party service started"
        );

        let service = Self {
            discovery,
            queue,
            running,
            tasks: vec![pump, sweeper, main_loop],
        };
        (service, events)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Starts a join attempt against `target`.  The outcome arrives on the
    /// event stream returned by [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotRunning`] after shutdown.
    pub fn join(&self, target: SocketAddr) -> Result<JoinId, ServiceError> {
        if !self.is_running() {
            return Err(ServiceError::NotRunning);
        }

        let join_id = Uuid::new_v4();
        if !self.queue.post(MainTask::Begin { join_id, target }) {
            return Err(ServiceError::NotRunning);
        }
        Ok(join_id)
    }

    /// Issues a bare discovery query; `callback` runs exactly once.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotRunning`] after shutdown.  `callback` is not run.
    pub fn query(&self, host: SocketAddr, callback: QueryCallback) -> Result<(), ServiceError> {
        if !self.is_running() {
            return Err(ServiceError::NotRunning);
        }
        self.discovery.send_query(host, callback);
        Ok(())
    }

    pub fn discovery(&self) -> &Arc<DiscoveryHandler> {
        &self.discovery
    }

    /// Stops every task of this node.  Calling it again is a no-op.
    ///
    /// Queries still pending are failed so their callbacks keep the
    /// exactly-once contract; join attempts waiting on them are not resumed.
    pub async fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        let abandoned = self.fail_pending();
        info!(abandoned, "party service stopped");
    }

    /// Fails every query still in the registry; returns how many there were.
    fn fail_pending(&self) -> usize {
        let pending = self
            .discovery
            .registry()
            .sweep_expired(tokio::time::Instant::now(), Duration::ZERO);
        let abandoned = pending.len();
        for query in pending {
            query.fail();
        }
        abandoned
    }
}

impl Drop for PartyService {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for task in &self.tasks {
            task.abort();
        }

        let abandoned = self.fail_pending();
        if abandoned > 0 {
            info!(abandoned, "party service dropped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
