//! Simulated host application.
//!
//! Stands in for the game process a party node is embedded in.  It holds a
//! handful of configuration variables and the current game mode.  It also
//! keeps a log of the launch commands and session attachments it received,
//! so tests can observe exactly what the orchestrator asked of it.
//!
//! Clones share state.  One clone is typically handed to the discovery
//! handler as [`HostInfo`] and another to the orchestrator as
//! [`HostSession`].
//!
//! # Mode switches
//!
//! A real host launches a new mode asynchronously and may never get there.
//! The simulation models both outcomes: with `apply_mode_switches` enabled a
//! recognised mode takes effect immediately, otherwise the request is only
//! recorded.  An unrecognised mode has no launch command and is ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use party_core::protocol::messages::host_vars;
use party_core::GameMode;
use tracing::{debug, info};

use crate::application::discovery::HostInfo;
use crate::application::join::HostSession;

/// One call to [`HostSession::session_attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub target: SocketAddr,
    pub mode: GameMode,
    pub map_name: String,
    pub game_type: String,
}

#[derive(Debug)]
struct HostState {
    vars: HashMap<String, String>,
    mode: GameMode,
    apply_mode_switches: bool,
    launch_log: Vec<&'static str>,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
    identity: String,
}

impl SimulatedHost {
    /// A host in `mode` with no session variables set.
    pub fn new(mode: GameMode, identity: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                vars: HashMap::new(),
                mode,
                apply_mode_switches: true,
                launch_log: Vec::new(),
                attachments: Vec::new(),
            })),
            identity: identity.into(),
        }
    }

    /// A host running a session that a remote node can join.
    pub fn hosting(
        mode: GameMode,
        identity: impl Into<String>,
        hostname: &str,
        map_name: &str,
        game_type: &str,
    ) -> Self {
        let host = Self::new(mode, identity);
        host.set_var(host_vars::HOST_NAME, hostname);
        host.set_var(host_vars::MAP_NAME, map_name);
        host.set_var(host_vars::GAME_TYPE, game_type);
        host
    }

    pub fn set_var(&self, name: &str, value: &str) {
        self.lock().vars.insert(name.to_string(), value.to_string());
    }

    /// When `false`, mode-switch requests are recorded but never take effect.
    pub fn apply_mode_switches(&self, apply: bool) {
        self.lock().apply_mode_switches = apply;
    }

    /// Launch commands issued so far, oldest first.
    pub fn launch_log(&self) -> Vec<&'static str> {
        self.lock().launch_log.clone()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.lock().attachments.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostInfo for SimulatedHost {
    fn config_string(&self, name: &str) -> String {
        self.lock().vars.get(name).cloned().unwrap_or_default()
    }

    fn current_game_mode(&self) -> GameMode {
        self.lock().mode
    }

    fn local_identity(&self) -> String {
        self.identity.clone()
    }
}

impl HostSession for SimulatedHost {
    fn current_game_mode(&self) -> GameMode {
        self.lock().mode
    }

    fn request_mode_switch(&mut self, mode: GameMode) {
        let Some(command) = mode.launch_command() else {
            debug!(%mode, "no launch command, mode switch ignored");
            return;
        };

        let mut state = self.lock();
        state.launch_log.push(command);
        if state.apply_mode_switches {
            state.mode = mode;
        }
        info!(command, "launch command issued");
    }

    fn session_attach(
        &mut self,
        target: SocketAddr,
        mode: GameMode,
        map_name: &str,
        game_type: &str,
    ) {
        self.lock().attachments.push(Attachment {
            target,
            mode,
            map_name: map_name.to_string(),
            game_type: game_type.to_string(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
