//! Info-string codec: the ordered key/value text record carried by
//! `infoResponse` messages.
//!
//! Wire format:
//! ```text
//! \key1\value1\key2\value2...
//! ```
//! Every pair is introduced by the [`DELIMITER`] character.  Keys are unique
//! within a record and keep the position of their first insertion.
//!
//! # Why is decoding infallible? (for beginners)
//!
//! Info strings arrive from arbitrary hosts over an unreliable transport.  A
//! truncated or garbled record is an expected condition, not a bug, so the
//! decoder keeps every complete pair it can find and drops the rest.  Callers
//! then treat a missing key as "not provided": [`InfoString::get`] returns an
//! empty string for absent keys instead of an error.

use std::fmt;

use thiserror::Error;

/// Separator placed before every key and every value on the wire.
pub const DELIMITER: char = '\\';

/// Errors raised when inserting a pair that could not be encoded faithfully.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InfoStringError {
    /// Keys must contain at least one character.
    #[error("info string keys must not be empty")]
    EmptyKey,

    /// The key or value contains the delimiter and would split on decode.
    #[error("{field} contains the reserved delimiter: {text:?}")]
    ReservedCharacter { field: &'static str, text: String },
}

/// An ordered key/value record.
///
/// # Examples
///
/// ```rust
/// use party_core::protocol::info_string::InfoString;
///
/// let mut info = InfoString::new();
/// info.set("mapname", "mp_foo").unwrap();
/// info.set("gametype", "dm").unwrap();
///
/// let bytes = info.encode();
/// assert_eq!(bytes, b"\\mapname\\mp_foo\\gametype\\dm");
///
/// let decoded = InfoString::decode(&bytes);
/// assert_eq!(decoded.get("mapname"), "mp_foo");
/// assert_eq!(decoded.get("hostname"), "");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoString {
    pairs: Vec<(String, String)>,
}

impl InfoString {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`.
    ///
    /// Replacing keeps the key at its original position so that encoding stays
    /// deterministic for a given sequence of `set` calls.
    ///
    /// # Errors
    ///
    /// Returns [`InfoStringError::EmptyKey`] for an empty key and
    /// [`InfoStringError::ReservedCharacter`] if either side contains
    /// [`DELIMITER`].
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), InfoStringError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() {
            return Err(InfoStringError::EmptyKey);
        }
        check_reserved("key", &key)?;
        check_reserved("value", &value)?;

        self.insert_unchecked(key, value);
        Ok(())
    }

    /// Returns the value for `key`, or `""` when the key is absent.
    pub fn get(&self, key: &str) -> &str {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Returns `true` if `key` is present (even with an empty value).
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialises the record into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parses a wire record, keeping every complete pair.
    ///
    /// Never fails: invalid UTF-8 is replaced lossily, a trailing key without a
    /// value is dropped, and a repeated key keeps the last value seen.
    pub fn decode(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let body = text.strip_prefix(DELIMITER).unwrap_or(&text);

        let mut info = Self::new();
        if body.is_empty() {
            return info;
        }

        let mut segments = body.split(DELIMITER);
        while let (Some(key), Some(value)) = (segments.next(), segments.next()) {
            if key.is_empty() {
                continue;
            }
            info.insert_unchecked(key.to_string(), value.to_string());
        }

        info
    }

    fn insert_unchecked(&mut self, key: String, value: String) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }
}

impl fmt::Display for InfoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.pairs {
            write!(f, "{DELIMITER}{key}{DELIMITER}{value}")?;
        }
        Ok(())
    }
}

/// Removes every [`DELIMITER`] from `text` so it can be stored as a value.
///
/// Used for host-provided strings (hostnames, map names) that the local node
/// does not control.
pub fn strip_delimiter(text: &str) -> String {
    text.chars().filter(|&c| c != DELIMITER).collect()
}

fn check_reserved(field: &'static str, text: &str) -> Result<(), InfoStringError> {
    if text.contains(DELIMITER) {
        return Err(InfoStringError::ReservedCharacter {
            field,
            text: text.to_string(),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
