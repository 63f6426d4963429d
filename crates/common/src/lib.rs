//! Shared types for the apiary honeypot fleet workspace.
//!
//! Keep cross-crate API DTOs here so the server and its integration tests
//! agree on the wire format.

#![warn(missing_docs)]

/// Shared API DTOs for cross-crate use.
pub mod api;
