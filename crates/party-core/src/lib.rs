//! # party-core
//!
//! Shared building blocks for the party discovery protocol: the info-string
//! codec, challenge tokens, message tags, and the game-mode vocabulary.
//!
//! This crate has no sockets, tasks, or global state.  `party-node` builds the
//! query registry, the discovery handler, and the join orchestrator on top of
//! it.
//!
//! # Protocol overview
//!
//! ```text
//! Joining node                         Remote host
//! ────────────                         ───────────
//! getInfo  <challenge>          ──►
//!                               ◄──    infoResponse \challenge\<challenge>\gamename\T7\...
//! match (host, challenge)
//! validate, switch mode, attach
//! ```

pub mod domain;
pub mod protocol;

pub use domain::game_mode::GameMode;
pub use protocol::challenge::{new_challenge, ChallengeSource, OsChallengeSource};
pub use protocol::info_string::{InfoString, InfoStringError};
pub use protocol::messages::MessageType;
