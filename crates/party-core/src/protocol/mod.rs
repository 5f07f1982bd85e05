//! Protocol module containing the info-string codec, challenge tokens, and
//! message tags.

pub mod challenge;
pub mod info_string;
pub mod messages;

pub use challenge::{new_challenge, ChallengeSource, OsChallengeSource};
pub use info_string::{InfoString, InfoStringError};
pub use messages::{keys, MessageType, GAME_NAME, PROTOCOL_VERSION, SHORT_VERSION};
