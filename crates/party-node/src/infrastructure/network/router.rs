//! Dispatch of inbound datagrams to per-message-type handlers.
//!
//! The router is filled once at startup with [`MessageRouter::on`] and then
//! moved onto the receive task by [`MessageRouter::spawn`].  Handlers run on
//! that task, one datagram at a time.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use party_core::MessageType;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::discovery::DiscoveryHandler;
use crate::infrastructure::network::loopback::Datagram;

/// Callback for one message type: `(sender, payload)`.
pub type MessageHandler = Box<dyn Fn(SocketAddr, &[u8]) + Send + Sync + 'static>;

#[derive(Default)]
pub struct MessageRouter {
    handlers: HashMap<MessageType, MessageHandler>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with both discovery messages wired to `handler`.
    pub fn for_discovery(handler: Arc<DiscoveryHandler>) -> Self {
        let mut router = Self::new();

        let h = Arc::clone(&handler);
        router.on(MessageType::GetInfo, move |sender, payload| {
            h.on_get_info(sender, payload)
        });
        router.on(MessageType::InfoResponse, move |sender, payload| {
            handler.on_info_response(sender, payload)
        });

        router
    }

    /// Registers `handler` for `kind`, replacing any earlier one.
    pub fn on<F>(&mut self, kind: MessageType, handler: F)
    where
        F: Fn(SocketAddr, &[u8]) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    /// Hands `datagram` to its handler.  Returns `false` if none is
    /// registered for its type.
    pub fn dispatch(&self, datagram: &Datagram) -> bool {
        match self.handlers.get(&datagram.kind) {
            Some(handler) => {
                handler(datagram.from, &datagram.payload);
                true
            }
            None => {
                debug!(from = %datagram.from, kind = %datagram.kind, "no handler, datagram dropped");
                false
            }
        }
    }

    /// Spawns the receive pump.  It stops when the inbox closes or, on the
    /// next datagram, once `running` is cleared.
    pub fn spawn(
        self,
        mut inbox: mpsc::UnboundedReceiver<Datagram>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("receive pump started");
            while let Some(datagram) = inbox.recv().await {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                self.dispatch(&datagram);
            }
            info!("receive pump stopped");
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn datagram(kind: MessageType, payload: &[u8]) -> Datagram {
        Datagram {
            from: SocketAddr::from(([127, 0, 0, 1], 4000)),
            kind,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_dispatch_routes_by_message_type() {
        // Arrange
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let mut router = MessageRouter::new();
        router.on(MessageType::GetInfo, move |_, payload| {
            s.lock().unwrap().push(payload.to_vec())
        });

        // Act
        let routed = router.dispatch(&datagram(MessageType::GetInfo, b"abc"));
        let unrouted = router.dispatch(&datagram(MessageType::InfoResponse, b"def"));

        // Assert
        assert!(routed);
        assert!(!unrouted);
        assert_eq!(*seen.lock().unwrap(), vec![b"abc".to_vec()]);
    }

    #[test]
    fn test_on_replaces_existing_handler() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (Arc::clone(&hits), Arc::clone(&hits));
        let mut router = MessageRouter::new();
        router.on(MessageType::GetInfo, move |_, _| first.lock().unwrap().push(1));
        router.on(MessageType::GetInfo, move |_, _| second.lock().unwrap().push(2));

        router.dispatch(&datagram(MessageType::GetInfo, b""));

        assert_eq!(*hits.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_spawned_pump_exits_when_inbox_closes() {
        // Arrange
        let (tx, rx) = mpsc::unbounded_channel();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let mut router = MessageRouter::new();
        router.on(MessageType::InfoResponse, move |_, _| *c.lock().unwrap() += 1);
        let handle = router.spawn(rx, Arc::new(AtomicBool::new(true)));

        // Act
        tx.send(datagram(MessageType::InfoResponse, b"")).unwrap();
        tx.send(datagram(MessageType::InfoResponse, b"")).unwrap();
        drop(tx);
        tokio_test::assert_ok!(handle.await);

        // Assert
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
