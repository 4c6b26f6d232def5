//! cinder-server: the network shell around the cinder engine.
//!
//! Owns the TCP accept loop, per-connection sessions (including the
//! MULTI/EXEC/WATCH transaction layer), the command table, and the
//! wiring between the store's key-modified events and WATCHing
//! sessions.

pub mod commands;
pub mod config;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use server::ServerState;
pub use session::{Dispatch, Session};
