//! Sigil token server.
//!
//! Serves the token endpoints of `sigil-auth` over HTTP with storage chosen
//! by configuration.

pub mod config;
pub mod observability;
pub mod server;

pub use server::{AppState, SigilServer, Storage, build_app};
