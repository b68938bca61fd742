//! DeckSync reference server.
//!
//! Hosts presentations in memory and relays edits between collaborators
//! over the same socket protocol the `decksync-core` client speaks.

pub mod server;
