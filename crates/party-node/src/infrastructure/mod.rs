//! Infrastructure layer for a party node.
//!
//! Contains the adapters behind the application traits: the datagram router
//! and loopback transport, the simulated host application, TOML config
//! storage, and the [`runtime::PartyService`] that wires them together.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `party_core`, but MUST NOT be imported by the `application` layer.

pub mod host;
pub mod network;
pub mod runtime;
pub mod storage;
