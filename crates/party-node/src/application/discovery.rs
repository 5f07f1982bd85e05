//! DiscoveryHandler: the `getInfo` / `infoResponse` challenge-response protocol.
//!
//! Each node plays both roles:
//!
//! - **Passive side** – any well-formed `getInfo` is answered with an
//!   `infoResponse` describing the local session.  No registry lookup happens
//!   here: the querying node owns correlation, so unknown challenges are
//!   echoed back like any other.
//! - **Active side** – [`DiscoveryHandler::send_query`] registers a pending
//!   query and sends `getInfo`.  An inbound `infoResponse` is matched against
//!   the registry by `(sender, challenge)`; a match completes the query's
//!   callback, anything else is dropped.
//!
//! # Error absorption
//!
//! Datagrams are unreliable and unauthenticated, so malformed payloads, late
//! replies, and spoofed replies are normal.  The `handle_*` methods report
//! them as [`DiscoveryError`] for tests and diagnostics; the `on_*` entry
//! points registered with the transport log them and stop there.
//!
//! # Architecture
//!
//! The handler depends only on the [`Transport`] and [`HostInfo`] traits, so
//! the same code runs over the loopback network in tests and over a real
//! transport in production.

use std::net::SocketAddr;
use std::sync::Arc;

use party_core::protocol::{
    info_string::strip_delimiter,
    keys,
    messages::{host_vars, GAME_NAME, PROTOCOL_VERSION, SHORT_VERSION},
};
use party_core::{GameMode, InfoString, MessageType};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::application::query_registry::{QueryCallback, QueryRegistry};

/// Failure to hand a datagram to the transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no route to {0}")]
    Unreachable(SocketAddr),
    #[error("transport is shut down")]
    Closed,
}

/// Outbound half of the datagram transport.
///
/// The transport frames `(address, message_type, payload)`; inbound delivery
/// is wired separately through the message router.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        to: SocketAddr,
        kind: MessageType,
        payload: &[u8],
    ) -> Result<(), TransportError>;
}

/// Read-only view of the host application used to answer `getInfo`.
///
/// Called from the network receive context, so implementations must be
/// thread-safe and must not mutate session state.
pub trait HostInfo: Send + Sync {
    /// Looks up a host configuration variable; unknown names yield `""`.
    fn config_string(&self, name: &str) -> String;

    fn current_game_mode(&self) -> GameMode;

    /// Opaque identity of the local player, advertised as `xuid`.
    fn local_identity(&self) -> String;
}

/// Anomalies raised while processing discovery traffic.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("malformed {kind} payload from {sender}: {reason}")]
    MalformedPayload {
        sender: SocketAddr,
        kind: MessageType,
        reason: String,
    },
    #[error("unmatched infoResponse from {sender} (challenge {challenge:?})")]
    UnmatchedReply {
        sender: SocketAddr,
        challenge: String,
    },
    #[error("failed to send {kind} to {to}: {source}")]
    Send {
        to: SocketAddr,
        kind: MessageType,
        #[source]
        source: TransportError,
    },
}

/// Both sides of the discovery protocol for one node.
pub struct DiscoveryHandler {
    registry: Arc<QueryRegistry>,
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostInfo>,
}

impl DiscoveryHandler {
    pub fn new(
        registry: Arc<QueryRegistry>,
        transport: Arc<dyn Transport>,
        host: Arc<dyn HostInfo>,
    ) -> Self {
        Self {
            registry,
            transport,
            host,
        }
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Issues a `getInfo` query to `host`.
    ///
    /// `callback` runs exactly once: with the reply when one matches, or with
    /// a failure once the sweeper expires the query.  If the registry refuses
    /// the query, the failure is reported immediately and nothing is sent.
    /// A send error leaves the query pending; it then times out like a lost
    /// datagram would.
    ///
    /// Returns `true` once `getInfo` has been handed to the transport.
    pub fn send_query(&self, host: SocketAddr, callback: QueryCallback) -> bool {
        let challenge = match self.registry.register(host, callback) {
            Ok(challenge) => challenge,
            Err(err) => {
                warn!(%host, "getInfo not issued: {err}");
                err.into_query().fail();
                return false;
            }
        };

        debug!(%host, %challenge, "sending getInfo");
        match self
            .transport
            .send(host, MessageType::GetInfo, challenge.as_bytes())
        {
            Ok(()) => true,
            Err(source) => {
                warn!(%host, "getInfo send failed, query will time out: {source}");
                false
            }
        }
    }

    /// Transport entry point for `getInfo`; anomalies are logged and dropped.
    pub fn on_get_info(&self, sender: SocketAddr, payload: &[u8]) {
        if let Err(err) = self.handle_get_info(sender, payload) {
            debug!("dropped getInfo: {err}");
        }
    }

    /// Transport entry point for `infoResponse`; anomalies are logged and
    /// dropped.
    pub fn on_info_response(&self, sender: SocketAddr, payload: &[u8]) {
        if let Err(err) = self.handle_info_response(sender, payload) {
            debug!("dropped infoResponse: {err}");
        }
    }

    /// Answers a `getInfo` from `sender` with a description of the local
    /// session, echoing the challenge in `payload`.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::MalformedPayload`] if the challenge cannot be echoed
    /// inside an info string, [`DiscoveryError::Send`] if the reply could not
    /// be handed to the transport.
    pub fn handle_get_info(&self, sender: SocketAddr, payload: &[u8]) -> Result<(), DiscoveryError> {
        let challenge = String::from_utf8_lossy(payload);
        let info = self
            .build_info_response(&challenge)
            .map_err(|reason| DiscoveryError::MalformedPayload {
                sender,
                kind: MessageType::GetInfo,
                reason,
            })?;

        trace!(%sender, "answering getInfo");
        self.transport
            .send(sender, MessageType::InfoResponse, &info.encode())
            .map_err(|source| DiscoveryError::Send {
                to: sender,
                kind: MessageType::InfoResponse,
                source,
            })
    }

    /// Matches an `infoResponse` from `sender` against the pending queries
    /// and completes the matching query's callback.
    ///
    /// The callback runs after the registry lock has been released.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::MalformedPayload`] if the record carries no
    /// challenge, [`DiscoveryError::UnmatchedReply`] if no pending query has
    /// this `(sender, challenge)`.  The registry is unchanged in both cases.
    pub fn handle_info_response(
        &self,
        sender: SocketAddr,
        payload: &[u8],
    ) -> Result<(), DiscoveryError> {
        let info = InfoString::decode(payload);
        let challenge = info.get(keys::CHALLENGE);
        if challenge.is_empty() {
            return Err(DiscoveryError::MalformedPayload {
                sender,
                kind: MessageType::InfoResponse,
                reason: "missing challenge".to_string(),
            });
        }

        let query = self
            .registry
            .take_matching(sender, challenge)
            .ok_or_else(|| DiscoveryError::UnmatchedReply {
                sender,
                challenge: challenge.to_string(),
            })?;

        debug!(%sender, challenge = %query.challenge, "infoResponse matched");
        query.complete(info);
        Ok(())
    }

    /// Builds the record sent in reply to `getInfo`.
    ///
    /// Host-provided strings have the delimiter stripped; only the echoed
    /// challenge can make this fail.
    pub fn build_info_response(&self, challenge: &str) -> Result<InfoString, String> {
        let host_var = |name: &str| strip_delimiter(&self.host.config_string(name));

        let mut info = InfoString::new();
        info.set(keys::CHALLENGE, challenge)
            .map_err(|e| e.to_string())?;

        let fields = [
            (keys::GAME_NAME, GAME_NAME.to_string()),
            (keys::HOST_NAME, host_var(host_vars::HOST_NAME)),
            (keys::GAME_TYPE, host_var(host_vars::GAME_TYPE)),
            (keys::XUID, strip_delimiter(&self.host.local_identity())),
            (keys::MAP_NAME, host_var(host_vars::MAP_NAME)),
            (keys::PROTOCOL, PROTOCOL_VERSION.to_string()),
            (
                keys::PLAY_MODE,
                self.host.current_game_mode().to_wire().to_string(),
            ),
            (keys::SHORT_VERSION, SHORT_VERSION.to_string()),
        ];
        for (key, value) in fields {
            info.set(key, value).map_err(|e| e.to_string())?;
        }

        Ok(info)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(SocketAddr, MessageType, Vec<u8>)>>,
        should_fail: bool,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<(SocketAddr, MessageType, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn send(
            &self,
            to: SocketAddr,
            kind: MessageType,
            payload: &[u8],
        ) -> Result<(), TransportError> {
            if self.should_fail {
                return Err(TransportError::Unreachable(to));
            }
            self.sent.lock().unwrap().push((to, kind, payload.to_vec()));
            Ok(())
        }
    }

    struct StaticHost {
        vars: HashMap<&'static str, &'static str>,
        mode: GameMode,
    }

    impl Default for StaticHost {
        fn default() -> Self {
            Self {
                vars: HashMap::from([
                    ("sv_hostname", "Friday\\Night"),
                    ("g_gametype", "dm"),
                    ("mapname", "mp_foo"),
                ]),
                mode: GameMode::Multiplayer,
            }
        }
    }

    impl HostInfo for StaticHost {
        fn config_string(&self, name: &str) -> String {
            self.vars.get(name).copied().unwrap_or_default().to_string()
        }

        fn current_game_mode(&self) -> GameMode {
            self.mode
        }

        fn local_identity(&self) -> String {
            "110000100000001".to_string()
        }
    }

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 3074))
    }

    fn make_handler(transport: Arc<RecordingTransport>) -> DiscoveryHandler {
        DiscoveryHandler::new(
            Arc::new(QueryRegistry::default()),
            transport,
            Arc::new(StaticHost::default()),
        )
    }

    fn reply_for(challenge: &str) -> Vec<u8> {
        let mut info = InfoString::new();
        info.set(keys::CHALLENGE, challenge).unwrap();
        info.set(keys::GAME_NAME, "T7").unwrap();
        info.set(keys::MAP_NAME, "mp_foo").unwrap();
        info.encode()
    }

    #[test]
    fn test_send_query_registers_and_sends_challenge() {
        // Arrange
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(Arc::clone(&transport));

        // Act
        let handed_off = handler.send_query(addr(1), Box::new(|_, _, _| {}));

        // Assert
        assert!(handed_off);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let (to, kind, payload) = &sent[0];
        assert_eq!(*to, addr(1));
        assert_eq!(*kind, MessageType::GetInfo);
        let challenge = String::from_utf8(payload.clone()).unwrap();
        assert!(handler.registry().contains(addr(1), &challenge));
    }

    #[test]
    fn test_send_query_keeps_query_pending_when_send_fails() {
        let transport = Arc::new(RecordingTransport {
            should_fail: true,
            ..Default::default()
        });
        let handler = make_handler(transport);

        let handed_off = handler.send_query(addr(1), Box::new(|_, _, _| {}));

        assert!(!handed_off);
        assert_eq!(handler.registry().len(), 1, "the sweeper owns the failure");
    }

    #[test]
    fn test_send_query_fails_immediately_when_registry_full() {
        // Arrange
        let transport = Arc::new(RecordingTransport::default());
        let handler = DiscoveryHandler::new(
            Arc::new(QueryRegistry::new(0)),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(StaticHost::default()),
        );
        let failures = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&failures);

        // Act
        let handed_off = handler.send_query(
            addr(1),
            Box::new(move |success, host, info| {
                assert!(!success);
                assert_eq!(host, addr(1));
                assert!(info.is_empty());
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );

        // Assert
        assert!(!handed_off);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(transport.sent().is_empty(), "nothing may be sent");
    }

    #[test]
    fn test_get_info_is_answered_with_full_record() {
        // Arrange
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(Arc::clone(&transport));

        // Act – the challenge is unknown to this node, which must not matter
        handler.handle_get_info(addr(7), b"deadbeef").unwrap();

        // Assert
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let (to, kind, payload) = &sent[0];
        assert_eq!(*to, addr(7));
        assert_eq!(*kind, MessageType::InfoResponse);

        let info = InfoString::decode(payload);
        assert_eq!(info.get(keys::CHALLENGE), "deadbeef");
        assert_eq!(info.get(keys::GAME_NAME), "T7");
        assert_eq!(info.get(keys::HOST_NAME), "FridayNight");
        assert_eq!(info.get(keys::GAME_TYPE), "dm");
        assert_eq!(info.get(keys::MAP_NAME), "mp_foo");
        assert_eq!(info.get(keys::XUID), "110000100000001");
        assert_eq!(info.get(keys::PROTOCOL), "1");
        assert_eq!(info.get(keys::PLAY_MODE), "1");
        assert_eq!(info.get(keys::SHORT_VERSION), SHORT_VERSION);
        assert!(handler.registry().is_empty(), "passive side never registers");
    }

    #[test]
    fn test_get_info_with_empty_challenge_is_answered() {
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(Arc::clone(&transport));

        handler.handle_get_info(addr(7), b"").unwrap();

        let info = InfoString::decode(&transport.sent()[0].2);
        assert!(info.contains_key(keys::CHALLENGE));
        assert_eq!(info.get(keys::CHALLENGE), "");
    }

    #[test]
    fn test_get_info_with_delimiter_in_challenge_is_dropped() {
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(Arc::clone(&transport));

        let result = handler.handle_get_info(addr(7), b"abc\\mapname\\evil");

        assert!(matches!(
            result,
            Err(DiscoveryError::MalformedPayload {
                kind: MessageType::GetInfo,
                ..
            })
        ));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_info_response_completes_matching_query_once() {
        // Arrange
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(Arc::clone(&transport));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&calls);
        handler.send_query(
            addr(1),
            Box::new(move |success, host, info| {
                c.lock().unwrap().push((success, host, info));
            }),
        );
        let challenge = String::from_utf8(transport.sent()[0].2.clone()).unwrap();

        // Act – the same reply delivered twice
        let first = handler.handle_info_response(addr(1), &reply_for(&challenge));
        let second = handler.handle_info_response(addr(1), &reply_for(&challenge));

        // Assert
        assert!(first.is_ok());
        assert!(matches!(second, Err(DiscoveryError::UnmatchedReply { .. })));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (success, host, info) = &calls[0];
        assert!(*success);
        assert_eq!(*host, addr(1));
        assert_eq!(info.get(keys::MAP_NAME), "mp_foo");
    }

    #[test]
    fn test_info_response_from_other_sender_is_unmatched() {
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(Arc::clone(&transport));
        handler.send_query(addr(1), Box::new(|_, _, _| panic!("must not fire")));
        let challenge = String::from_utf8(transport.sent()[0].2.clone()).unwrap();

        let result = handler.handle_info_response(addr(2), &reply_for(&challenge));

        assert!(matches!(result, Err(DiscoveryError::UnmatchedReply { .. })));
        assert_eq!(handler.registry().len(), 1);
    }

    #[test]
    fn test_info_response_without_challenge_is_malformed() {
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(transport);

        let result = handler.handle_info_response(addr(1), b"\\mapname\\mp_foo");

        assert!(matches!(
            result,
            Err(DiscoveryError::MalformedPayload {
                kind: MessageType::InfoResponse,
                ..
            })
        ));
    }

    #[test]
    fn test_on_handlers_absorb_errors() {
        let transport = Arc::new(RecordingTransport::default());
        let handler = make_handler(Arc::clone(&transport));

        // Neither call may panic or propagate anything.
        handler.on_info_response(addr(1), b"\xff\xff garbage");
        handler.on_get_info(addr(1), b"bad\\challenge");

        assert!(transport.sent().is_empty());
        assert!(handler.registry().is_empty());
    }
}
