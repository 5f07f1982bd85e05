//! Challenge tokens for correlating `getInfo` queries with their replies.
//!
//! A challenge is embedded in every outbound query and echoed back by the
//! remote host.  The querying side only accepts a reply from the same address
//! carrying the same token, so the token has to be unpredictable: a counter
//! would let any host on the path forge a matching `infoResponse`.
//!
//! Tokens are 128 bits drawn from the operating system's CSPRNG and rendered
//! as 32 lowercase hex digits, which keeps them free of the info-string
//! delimiter and makes collisions within a 10 second window negligible.

use rand::{rngs::OsRng, RngCore};

/// Length in characters of a token produced by [`new_challenge`].
pub const CHALLENGE_LEN: usize = 32;

/// Produces a fresh, unguessable challenge token.
///
/// # Examples
///
/// ```rust
/// use party_core::protocol::challenge::{new_challenge, CHALLENGE_LEN};
///
/// let token = new_challenge();
/// assert_eq!(token.len(), CHALLENGE_LEN);
/// assert_ne!(token, new_challenge());
/// ```
pub fn new_challenge() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{:032x}", u128::from_be_bytes(bytes))
}

/// Source of challenge tokens.
///
/// The query registry draws tokens through this trait so tests can inject a
/// deterministic sequence.
pub trait ChallengeSource: Send + Sync {
    fn next_challenge(&self) -> String;
}

/// The production [`ChallengeSource`], backed by [`new_challenge`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OsChallengeSource;

impl ChallengeSource for OsChallengeSource {
    fn next_challenge(&self) -> String {
        new_challenge()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::protocol::info_string::DELIMITER;

    #[test]
    fn test_new_challenge_is_fixed_length_lowercase_hex() {
        let token = new_challenge();
        assert_eq!(token.len(), CHALLENGE_LEN);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert!(!token.contains(DELIMITER));
    }

    #[test]
    fn test_new_challenge_does_not_repeat() {
        // Arrange / Act
        let tokens: HashSet<String> = (0..1000).map(|_| new_challenge()).collect();

        // Assert
        assert_eq!(tokens.len(), 1000, "1000 draws must produce 1000 tokens");
    }

    #[test]
    fn test_os_challenge_source_delegates_to_new_challenge() {
        let source = OsChallengeSource;
        assert_eq!(source.next_challenge().len(), CHALLENGE_LEN);
    }
}
