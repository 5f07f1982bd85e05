//! Message tags, record keys, and product identity for the discovery protocol.
//!
//! The transport frames every datagram as `(address, message_type, payload)`.
//! This module only names the message types and the info-record keys; the
//! framing itself belongs to the transport.

use std::fmt;

/// Product identity advertised in the `gamename` key.
pub const GAME_NAME: &str = "T7";

/// Protocol revision advertised in the `protocol` key.
pub const PROTOCOL_VERSION: u32 = 1;

/// Short build version advertised in the `shortversion` key.
pub const SHORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Keys used in `infoResponse` records.
pub mod keys {
    pub const CHALLENGE: &str = "challenge";
    pub const GAME_NAME: &str = "gamename";
    pub const HOST_NAME: &str = "hostname";
    pub const GAME_TYPE: &str = "gametype";
    pub const XUID: &str = "xuid";
    pub const MAP_NAME: &str = "mapname";
    pub const PROTOCOL: &str = "protocol";
    pub const PLAY_MODE: &str = "playmode";
    pub const SHORT_VERSION: &str = "shortversion";
}

/// Host configuration variables read when answering `getInfo`.
pub mod host_vars {
    pub const HOST_NAME: &str = "sv_hostname";
    pub const GAME_TYPE: &str = "g_gametype";
    pub const MAP_NAME: &str = "mapname";
}

/// The message-type tag carried alongside every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Query; the payload is the challenge token.
    GetInfo,
    /// Reply; the payload is an encoded info string.
    InfoResponse,
}

impl MessageType {
    /// Returns the tag exactly as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::GetInfo => "getInfo",
            MessageType::InfoResponse => "infoResponse",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
