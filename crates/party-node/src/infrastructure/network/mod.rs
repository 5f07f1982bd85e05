//! Network infrastructure for a party node.
//!
//! # Sub-modules
//!
//! - **`router`** – Maps each inbound [`party_core::MessageType`] to the
//!   handler registered for it and runs the receive pump task.
//!
//! - **`loopback`** – In-process datagram hub.  Every endpoint gets a
//!   [`crate::application::discovery::Transport`] for sending and a channel
//!   of inbound datagrams.  Used by the integration tests and the demo
//!   binary in place of a UDP socket.

pub mod loopback;
pub mod router;
