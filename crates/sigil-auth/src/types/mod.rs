//! Domain types shared by the token layer and the stores.

pub mod revocation;
pub mod user;

pub use revocation::{BlacklistedToken, NewOutstandingToken, OutstandingToken, hash_token};
pub use user::{AuthUser, User, UserId};
