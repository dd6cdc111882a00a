//! Storage traits for revocation records and user lookup.
//!
//! - [`RevocationStore`]: outstanding and blacklisted refresh tokens
//! - [`UserStore`]: user lookup and last-login bookkeeping
//!
//! # Implementations
//!
//! - [`memory`]: in-process stores for tests and single-node deployments
//! - `sigil-auth-postgres`: PostgreSQL storage backend

pub mod memory;
pub mod revocation;
pub mod user;

pub use memory::{InMemoryRevocationStore, InMemoryUserStore};
pub use revocation::RevocationStore;
pub use user::UserStore;
