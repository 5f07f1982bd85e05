//! Storage infrastructure: node configuration persistence.
//!
//! The `config` sub-module reads the TOML configuration file named on the
//! command line, writes it back when asked, and supplies defaults for
//! anything the file leaves out.

pub mod config;
