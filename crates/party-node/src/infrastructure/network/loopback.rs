//! In-process datagram network.
//!
//! [`LoopbackNetwork`] is a hub of named endpoints.  Each call to
//! [`LoopbackNetwork::bind`] reserves an address and returns a
//! [`LoopbackTransport`] for sending plus a receiver of inbound
//! [`Datagram`]s.  Delivery is unordered across senders and may be
//! suppressed per destination to model lost packets, which is all the
//! discovery protocol assumes of a real datagram socket.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use party_core::MessageType;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

use crate::application::discovery::{Transport, TransportError};

/// One message as seen by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub from: SocketAddr,
    pub kind: MessageType,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("address {0} is already bound")]
    AddrInUse(SocketAddr),
}

#[derive(Default)]
struct Endpoints {
    inboxes: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    blackholed: HashSet<SocketAddr>,
}

/// Shared hub connecting every bound endpoint.  Cloning yields another
/// handle to the same network.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    endpoints: Arc<Mutex<Endpoints>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `addr` on this network.
    ///
    /// # Errors
    ///
    /// [`BindError::AddrInUse`] if another endpoint holds `addr`.
    pub fn bind(
        &self,
        addr: SocketAddr,
    ) -> Result<(LoopbackTransport, mpsc::UnboundedReceiver<Datagram>), BindError> {
        let mut endpoints = self.lock();
        if endpoints.inboxes.contains_key(&addr) {
            return Err(BindError::AddrInUse(addr));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        endpoints.inboxes.insert(addr, tx);

        let transport = LoopbackTransport {
            local: addr,
            network: self.clone(),
        };
        Ok((transport, rx))
    }

    /// Releases `addr`; later sends to it fail as unreachable.
    pub fn unbind(&self, addr: SocketAddr) {
        self.lock().inboxes.remove(&addr);
    }

    /// Silently discards every datagram addressed to `addr` until
    /// [`restore`](Self::restore) is called.
    pub fn blackhole(&self, addr: SocketAddr) {
        self.lock().blackholed.insert(addr);
    }

    pub fn restore(&self, addr: SocketAddr) {
        self.lock().blackholed.remove(&addr);
    }

    fn deliver(&self, to: SocketAddr, datagram: Datagram) -> Result<(), TransportError> {
        let endpoints = self.lock();
        if endpoints.blackholed.contains(&to) {
            trace!(%to, kind = %datagram.kind, "datagram lost");
            return Ok(());
        }

        let inbox = endpoints
            .inboxes
            .get(&to)
            .ok_or(TransportError::Unreachable(to))?;
        inbox
            .send(datagram)
            .map_err(|_| TransportError::Unreachable(to))
    }

    fn lock(&self) -> MutexGuard<'_, Endpoints> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sending half of one bound endpoint.
#[derive(Clone)]
pub struct LoopbackTransport {
    local: SocketAddr,
    network: LoopbackNetwork,
}

impl Transport for LoopbackTransport {
    fn send(
        &self,
        to: SocketAddr,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.network.deliver(
            to,
            Datagram {
                from: self.local,
                kind,
                payload: payload.to_vec(),
            },
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
