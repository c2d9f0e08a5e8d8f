//! Conductor gateway — the HTTP/WS front door (§4.J) plus the
//! configuration, key-material, and cleanup-scheduler bootstrapping (§4.K,
//! §4.L) that the binary in `main.rs` wires together.

pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod cors;
pub mod keys;
pub mod routes;
pub mod state;
