//! QueryRegistry: the store of in-flight `getInfo` queries.
//!
//! Every outbound query is recorded here under the composite key
//! `(host, challenge)` until exactly one of two things happens:
//!
//! - a matching `infoResponse` arrives and [`QueryRegistry::take_matching`]
//!   moves the query out, or
//! - the query ages past the timeout and [`QueryRegistry::sweep_expired`]
//!   moves it out.
//!
//! Both operations remove the entry under the same lock, so a query can be
//! taken by a reply or by the sweeper, never both.  Neither operation invokes
//! the query's callback: the caller does that after the lock is released, so a
//! callback that re-enters the registry (for example to issue a follow-up
//! query) cannot deadlock.
//!
//! # Lifecycle of a pending query
//!
//! ```text
//! register ──► pending ──► take_matching ──► callback(true,  info)
//!                  │
//!                  └─────► sweep_expired ──► callback(false, empty)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use party_core::{ChallengeSource, InfoString, OsChallengeSource};
use thiserror::Error;
use tokio::time::Instant;

/// Default upper bound on simultaneously pending queries.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fresh challenges drawn before giving up on a colliding `(host, challenge)`.
const MAX_CHALLENGE_DRAWS: usize = 4;

/// Completion handler for a query: `(success, host, info)`.
///
/// Invoked exactly once, with `success = true` and the decoded reply, or with
/// `success = false` and an empty record.
pub type QueryCallback = Box<dyn FnOnce(bool, SocketAddr, InfoString) + Send + 'static>;

/// An in-flight discovery query.
pub struct PendingQuery {
    pub host: SocketAddr,
    pub challenge: String,
    pub issued_at: Instant,
    callback: QueryCallback,
}

impl PendingQuery {
    pub fn new(
        host: SocketAddr,
        challenge: String,
        issued_at: Instant,
        callback: QueryCallback,
    ) -> Self {
        Self {
            host,
            challenge,
            issued_at,
            callback,
        }
    }

    /// Time elapsed between issuing the query and `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.issued_at)
    }

    /// Consumes the query, reporting a matched reply.
    pub fn complete(self, info: InfoString) {
        (self.callback)(true, self.host, info);
    }

    /// Consumes the query, reporting that no reply will be delivered.
    pub fn fail(self) {
        (self.callback)(false, self.host, InfoString::new());
    }
}

impl fmt::Debug for PendingQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingQuery")
            .field("host", &self.host)
            .field("challenge", &self.challenge)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// Registration failures.  Each variant hands the unregistered query back so
/// the caller can still complete its callback.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("query registry is full ({capacity} pending queries)")]
    Full {
        capacity: usize,
        query: PendingQuery,
    },
    #[error("could not draw an unused challenge for {}", .query.host)]
    ChallengeCollision { query: PendingQuery },
}

impl RegistryError {
    /// Recovers the query that could not be registered.
    pub fn into_query(self) -> PendingQuery {
        match self {
            RegistryError::Full { query, .. } => query,
            RegistryError::ChallengeCollision { query } => query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QueryKey {
    host: SocketAddr,
    challenge: String,
}

/// Thread-safe, size-bounded map of pending queries keyed by
/// `(host, challenge)`.
///
/// # HashMap choice
///
/// Replies are matched by exact key, so a `HashMap` gives O(1) average lookup
/// no matter how many queries are in flight.  Iteration order is irrelevant:
/// sweeping visits every entry anyway.
pub struct QueryRegistry {
    queries: Mutex<HashMap<QueryKey, PendingQuery>>,
    capacity: usize,
    challenges: Box<dyn ChallengeSource>,
}

impl QueryRegistry {
    /// Creates a registry drawing challenges from the OS CSPRNG.
    pub fn new(capacity: usize) -> Self {
        Self::with_challenge_source(capacity, Box::new(OsChallengeSource))
    }

    pub fn with_challenge_source(capacity: usize, challenges: Box<dyn ChallengeSource>) -> Self {
        Self {
            queries: Mutex::new(HashMap::new()),
            capacity,
            challenges,
        }
    }

    /// Records a new query to `host` and returns its challenge.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Full`] when `capacity` queries are already
    /// pending, and [`RegistryError::ChallengeCollision`] if every drawn
    /// challenge is already pending for `host`.  Neither stores anything.
    pub fn register(
        &self,
        host: SocketAddr,
        callback: QueryCallback,
    ) -> Result<String, RegistryError> {
        self.register_at(host, callback, Instant::now())
    }

    /// [`register`](Self::register) with an explicit issue time.
    pub fn register_at(
        &self,
        host: SocketAddr,
        callback: QueryCallback,
        issued_at: Instant,
    ) -> Result<String, RegistryError> {
        let mut queries = self.lock();

        if queries.len() >= self.capacity {
            return Err(RegistryError::Full {
                capacity: self.capacity,
                query: PendingQuery::new(host, String::new(), issued_at, callback),
            });
        }

        for _ in 0..MAX_CHALLENGE_DRAWS {
            let key = QueryKey {
                host,
                challenge: self.challenges.next_challenge(),
            };
            if queries.contains_key(&key) {
                continue;
            }

            let challenge = key.challenge.clone();
            let query = PendingQuery::new(host, challenge.clone(), issued_at, callback);
            queries.insert(key, query);
            return Ok(challenge);
        }

        Err(RegistryError::ChallengeCollision {
            query: PendingQuery::new(host, String::new(), issued_at, callback),
        })
    }

    /// Removes and returns the query registered for `(host, challenge)`.
    ///
    /// A second call with the same pair returns `None`.
    pub fn take_matching(&self, host: SocketAddr, challenge: &str) -> Option<PendingQuery> {
        let key = QueryKey {
            host,
            challenge: challenge.to_string(),
        };
        self.lock().remove(&key)
    }

    /// Removes and returns every query whose age at `now` is at least
    /// `threshold`.  Younger queries are left in place.
    pub fn sweep_expired(&self, now: Instant, threshold: Duration) -> Vec<PendingQuery> {
        let mut queries = self.lock();

        let expired: Vec<QueryKey> = queries
            .iter()
            .filter(|(_, query)| query.age(now) >= threshold)
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .iter()
            .filter_map(|key| queries.remove(key))
            .collect()
    }

    /// Returns `true` if a query for `(host, challenge)` is pending.
    pub fn contains(&self, host: SocketAddr, challenge: &str) -> bool {
        let key = QueryKey {
            host,
            challenge: challenge.to_string(),
        };
        self.lock().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic inside the critical section cannot leave the map half-updated:
    // every mutation is a single insert or remove.
    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, PendingQuery>> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
