//! Application layer use cases for a party node.
//!
//! # What lives here? (for beginners)
//!
//! The application layer sits between the wire protocol in `party_core` and
//! the infrastructure adapters (transport, host, storage).  Everything here
//! depends on traits rather than concrete adapters, so the same code runs over
//! the in-process loopback network in tests and over a real transport.
//!
//! # Sub-modules
//!
//! - **`query_registry`** – Thread-safe table of outstanding `getInfo`
//!   queries keyed by `(host, challenge)`.  Guarantees each query's callback
//!   runs exactly once.
//!
//! - **`discovery`** – Both sides of the `getInfo` / `infoResponse`
//!   challenge-response protocol.
//!
//! - **`sweeper`** – Periodic task that fails queries nobody answered.
//!
//! - **`join`** – Drives a join from "query this host" through validation and
//!   the game-mode switch to an attached session.  Runs on the main context.

pub mod discovery;
pub mod join;
pub mod query_registry;
pub mod sweeper;
