//! Domain types shared by every node.
//!
//! Pure data with no I/O, so both the passive (answering) and active
//! (joining) sides of the protocol agree on the same vocabulary.

pub mod game_mode;
