//! Session game modes and their numeric wire encoding.
//!
//! The `playmode` key of an `infoResponse` carries the host's current mode as
//! a decimal integer:
//!
//! | Wire | Mode          |
//! |------|---------------|
//! | `0`  | `Zombies`     |
//! | `1`  | `Multiplayer` |
//! | `2`  | `Campaign`    |
//!
//! Any other text, numeric or not, decodes to [`GameMode::Unrecognized`].

use std::fmt;

/// The mode a host session is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Zombies,
    Multiplayer,
    Campaign,
    /// The wire value did not name a known mode.
    Unrecognized,
}

impl GameMode {
    /// Decodes the `playmode` value of an info record.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().parse::<i32>() {
            Ok(0) => GameMode::Zombies,
            Ok(1) => GameMode::Multiplayer,
            Ok(2) => GameMode::Campaign,
            _ => GameMode::Unrecognized,
        }
    }

    /// Numeric value advertised in `playmode`; `Unrecognized` encodes as `3`,
    /// one past the last real mode.
    pub fn to_wire(self) -> i32 {
        match self {
            GameMode::Zombies => 0,
            GameMode::Multiplayer => 1,
            GameMode::Campaign => 2,
            GameMode::Unrecognized => 3,
        }
    }

    /// Console command that launches this mode, if the mode is launchable.
    pub fn launch_command(self) -> Option<&'static str> {
        match self {
            GameMode::Zombies => Some("startZombies;"),
            GameMode::Multiplayer => Some("startMultiplayer;"),
            GameMode::Campaign => Some("startCampaign;"),
            GameMode::Unrecognized => None,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameMode::Zombies => "zombies",
            GameMode::Multiplayer => "multiplayer",
            GameMode::Campaign => "campaign",
            GameMode::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}
