//! JoinOrchestrator: takes a host address to an attached session.
//!
//! # Join lifecycle
//!
//! ```text
//! Querying ──► AwaitingInfo ──► ValidatingInfo ──► SwitchingMode ──► Retrying ──► Finalizing ──► Attached
//!                   │                 │                  │                             ▲
//!                   └── timeout ──────┴── invalid ───────┼── already in mode ──────────┘
//!                                     ▼                  │
//!                                 Abandoned              │
//! ```
//!
//! - `Querying`: the info query is registered but `getInfo` has not reached
//!   the transport.  It can only end through the query's timeout.
//! - `AwaitingInfo`: a `getInfo` is in flight to the target.
//! - `ValidatingInfo`: `gamename`, then `mapname`, then `gametype` are checked;
//!   the first failure abandons the attempt before any host call is made.
//! - `SwitchingMode`: the host is asked to launch the advertised mode and a
//!   single re-check is scheduled after the mode-switch delay.
//! - `Retrying`: the re-check.  Whether or not the mode took effect, the
//!   attempt proceeds to `Finalizing`; there is no second retry.
//! - `Finalizing`/`Attached`: `session_attach` is called exactly once.  What
//!   the host's join subsystem does afterwards is its own business.
//!
//! # Main context
//!
//! The orchestrator is the only owner of the [`HostSession`] and runs on a
//! single task reading [`MainTask`]s from a [`MainQueue`].  Query callbacks
//! (which fire on the network or sweeper task) and the delayed re-check only
//! post messages to that queue, so host session state is never touched from
//! another context.
//!
//! The orchestrator itself keeps only a [`WeakMainQueue`].  Its loop ends
//! once the owner's [`MainQueue`] is gone and no query callback or re-check
//! still holds one.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use party_core::protocol::{keys, GAME_NAME};
use party_core::{GameMode, InfoString};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::discovery::DiscoveryHandler;

/// Delay between requesting a mode switch and checking that it took effect.
pub const DEFAULT_MODE_SWITCH_DELAY: Duration = Duration::from_secs(5);

/// Identifies one join attempt in logs and events.
pub type JoinId = Uuid;

/// Session-owning half of the host application.
///
/// Only ever called from the main context.
#[cfg_attr(test, automock)]
pub trait HostSession: Send {
    fn current_game_mode(&self) -> GameMode;

    /// Asks the host to launch `mode`.  Takes effect asynchronously, if at all.
    fn request_mode_switch(&mut self, mode: GameMode);

    /// Hands the target session to the host's join subsystem.
    fn session_attach(
        &mut self,
        target: SocketAddr,
        mode: GameMode,
        map_name: &str,
        game_type: &str,
    );
}

/// Why a join attempt was abandoned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("host did not answer the info query")]
    Unreachable,
    #[error("invalid gamename {found:?}")]
    InvalidGameName { found: String },
    #[error("invalid map")]
    MissingMapName,
    #[error("invalid gametype")]
    MissingGameType,
}

/// Terminal outcome of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinEvent {
    Attached {
        join_id: JoinId,
        target: SocketAddr,
        mode: GameMode,
        map_name: String,
        game_type: String,
        /// `false` when the host still was not in `mode` at the re-check.
        mode_confirmed: bool,
    },
    Abandoned {
        join_id: JoinId,
        target: SocketAddr,
        reason: JoinError,
    },
}

impl JoinEvent {
    pub fn join_id(&self) -> JoinId {
        match self {
            JoinEvent::Attached { join_id, .. } | JoinEvent::Abandoned { join_id, .. } => *join_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Querying,
    AwaitingInfo,
    ValidatingInfo,
    SwitchingMode,
    Retrying,
    Finalizing,
    Attached,
    Abandoned,
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A validated server description on its way to an attached session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAttempt {
    pub id: JoinId,
    pub target: SocketAddr,
    pub mode: GameMode,
    pub map_name: String,
    pub game_type: String,
    pub retried: bool,
    pub state: JoinState,
}

impl JoinAttempt {
    /// Validates an `infoResponse` in order: game identity, map, game type.
    ///
    /// # Errors
    ///
    /// The first failing check.
    pub fn from_info(id: JoinId, target: SocketAddr, info: &InfoString) -> Result<Self, JoinError> {
        let game_name = info.get(keys::GAME_NAME);
        if game_name != GAME_NAME {
            return Err(JoinError::InvalidGameName {
                found: game_name.to_string(),
            });
        }

        let map_name = info.get(keys::MAP_NAME);
        if map_name.is_empty() {
            return Err(JoinError::MissingMapName);
        }

        let game_type = info.get(keys::GAME_TYPE);
        if game_type.is_empty() {
            return Err(JoinError::MissingGameType);
        }

        Ok(Self {
            id,
            target,
            mode: GameMode::from_wire(info.get(keys::PLAY_MODE)),
            map_name: map_name.to_string(),
            game_type: game_type.to_string(),
            retried: false,
            state: JoinState::ValidatingInfo,
        })
    }

    fn transition(&mut self, next: JoinState) {
        debug!(join_id = %self.id, from = %self.state, to = %next, "join state");
        self.state = next;
    }
}

/// Work executed on the main context.
#[derive(Debug)]
pub enum MainTask {
    /// Start a new join attempt against `target`.
    Begin { join_id: JoinId, target: SocketAddr },
    /// The info query for `join_id` completed.
    QueryCompleted {
        join_id: JoinId,
        success: bool,
        info: InfoString,
    },
    /// The mode-switch delay for `join_id` elapsed.
    RecheckMode { join_id: JoinId },
}

/// Sending half of the main-context queue.
///
/// Posting never blocks; if the main loop has stopped, the task is dropped.
#[derive(Debug, Clone)]
pub struct MainQueue {
    tx: mpsc::UnboundedSender<MainTask>,
}

impl MainQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MainTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues `task` for the main context.  Returns `false` if the main loop
    /// is gone.
    pub fn post(&self, task: MainTask) -> bool {
        self.tx.send(task).is_ok()
    }

    /// Queues `task` for the main context after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn post_after(&self, task: MainTask, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(task);
        });
    }

    pub fn downgrade(&self) -> WeakMainQueue {
        WeakMainQueue {
            tx: self.tx.downgrade(),
        }
    }
}

/// A [`MainQueue`] handle that does not keep the main loop alive.
pub struct WeakMainQueue {
    tx: mpsc::WeakUnboundedSender<MainTask>,
}

impl WeakMainQueue {
    /// `None` once every [`MainQueue`] has been dropped.
    pub fn upgrade(&self) -> Option<MainQueue> {
        self.tx.upgrade().map(|tx| MainQueue { tx })
    }
}

/// An attempt whose info query has not completed yet.
#[derive(Debug, Clone, Copy)]
struct PendingJoin {
    target: SocketAddr,
    state: JoinState,
}

/// Drives every join attempt of one node.
///
/// Attempts are independent: a new join never cancels or waits for an
/// earlier one, even against the same host.
pub struct JoinOrchestrator {
    discovery: Arc<DiscoveryHandler>,
    host: Box<dyn HostSession>,
    queue: WeakMainQueue,
    events: mpsc::UnboundedSender<JoinEvent>,
    mode_switch_delay: Duration,
    awaiting: HashMap<JoinId, PendingJoin>,
    switching: HashMap<JoinId, JoinAttempt>,
}

impl JoinOrchestrator {
    pub fn new(
        discovery: Arc<DiscoveryHandler>,
        host: Box<dyn HostSession>,
        queue: &MainQueue,
        events: mpsc::UnboundedSender<JoinEvent>,
        mode_switch_delay: Duration,
    ) -> Self {
        Self {
            discovery,
            host,
            queue: queue.downgrade(),
            events,
            mode_switch_delay,
            awaiting: HashMap::new(),
            switching: HashMap::new(),
        }
    }

    /// Processes main-context tasks until no [`MainQueue`] is left: the one
    /// passed to [`new`](Self::new), its clones, and the strong handles held
    /// by pending query callbacks and scheduled re-checks.
    pub async fn run(mut self, mut tasks: mpsc::UnboundedReceiver<MainTask>) {
        while let Some(task) = tasks.recv().await {
            self.handle(task);
        }
        debug!("join orchestrator stopped");
    }

    pub fn handle(&mut self, task: MainTask) {
        match task {
            MainTask::Begin { join_id, target } => self.begin(join_id, target),
            MainTask::QueryCompleted {
                join_id,
                success,
                info,
            } => self.on_query_completed(join_id, success, info),
            MainTask::RecheckMode { join_id } => self.on_recheck(join_id),
        }
    }

    /// Current state of a live attempt; `None` once it is terminal or if it
    /// never existed.
    pub fn state_of(&self, join_id: JoinId) -> Option<JoinState> {
        self.awaiting
            .get(&join_id)
            .map(|pending| pending.state)
            .or_else(|| self.switching.get(&join_id).map(|attempt| attempt.state))
    }

    /// Number of attempts that have not reached a terminal state.
    pub fn in_flight(&self) -> usize {
        self.awaiting.len() + self.switching.len()
    }

    fn begin(&mut self, join_id: JoinId, target: SocketAddr) {
        let Some(queue) = self.queue.upgrade() else {
            debug!(%join_id, "main queue closed, join cannot be queried");
            self.abandon(join_id, target, JoinError::Unreachable);
            return;
        };

        info!(%join_id, %target, "joining");
        self.awaiting.insert(
            join_id,
            PendingJoin {
                target,
                state: JoinState::Querying,
            },
        );

        let handed_off = self.discovery.send_query(
            target,
            Box::new(move |success, _host, info| {
                queue.post(MainTask::QueryCompleted {
                    join_id,
                    success,
                    info,
                });
            }),
        );
        if !handed_off {
            return;
        }
        if let Some(pending) = self.awaiting.get_mut(&join_id) {
            debug!(%join_id, from = %pending.state, to = %JoinState::AwaitingInfo, "join state");
            pending.state = JoinState::AwaitingInfo;
        }
    }

    fn on_query_completed(&mut self, join_id: JoinId, success: bool, info: InfoString) {
        let Some(PendingJoin { target, .. }) = self.awaiting.remove(&join_id) else {
            debug!(%join_id, "query completion for unknown join");
            return;
        };

        if !success {
            self.abandon(join_id, target, JoinError::Unreachable);
            return;
        }

        match JoinAttempt::from_info(join_id, target, &info) {
            Ok(attempt) => self.switch_mode(attempt),
            Err(reason) => self.abandon(join_id, target, reason),
        }
    }

    fn switch_mode(&mut self, mut attempt: JoinAttempt) {
        attempt.transition(JoinState::SwitchingMode);

        if self.host.current_game_mode() == attempt.mode {
            self.finalize(attempt, true);
            return;
        }

        info!(join_id = %attempt.id, mode = %attempt.mode, "requesting mode switch");
        self.host.request_mode_switch(attempt.mode);
        let join_id = attempt.id;
        self.switching.insert(join_id, attempt);

        match self.queue.upgrade() {
            Some(queue) => {
                queue.post_after(MainTask::RecheckMode { join_id }, self.mode_switch_delay)
            }
            None => {
                debug!(%join_id, "main queue closed, re-checking mode now");
                self.on_recheck(join_id);
            }
        }
    }

    fn on_recheck(&mut self, join_id: JoinId) {
        let Some(mut attempt) = self.switching.remove(&join_id) else {
            debug!(%join_id, "mode re-check for unknown join");
            return;
        };

        attempt.retried = true;
        attempt.transition(JoinState::Retrying);

        let confirmed = self.host.current_game_mode() == attempt.mode;
        if !confirmed {
            warn!(
                join_id = %attempt.id,
                mode = %attempt.mode,
                "mode switch not confirmed, attaching anyway"
            );
        }
        self.finalize(attempt, confirmed);
    }

    fn finalize(&mut self, mut attempt: JoinAttempt, mode_confirmed: bool) {
        attempt.transition(JoinState::Finalizing);
        self.host.session_attach(
            attempt.target,
            attempt.mode,
            &attempt.map_name,
            &attempt.game_type,
        );
        attempt.transition(JoinState::Attached);

        info!(
            join_id = %attempt.id,
            target = %attempt.target,
            map = %attempt.map_name,
            gametype = %attempt.game_type,
            "attached to session"
        );
        self.emit(JoinEvent::Attached {
            join_id: attempt.id,
            target: attempt.target,
            mode: attempt.mode,
            map_name: attempt.map_name,
            game_type: attempt.game_type,
            mode_confirmed,
        });
    }

    fn abandon(&mut self, join_id: JoinId, target: SocketAddr, reason: JoinError) {
        info!(%join_id, %target, "join abandoned: {reason}");
        self.emit(JoinEvent::Abandoned {
            join_id,
            target,
            reason,
        });
    }

    fn emit(&self, event: JoinEvent) {
        if self.events.send(event).is_err() {
            debug!("join event receiver dropped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
