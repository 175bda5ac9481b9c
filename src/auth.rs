//! Access-token domain types: redacted secrets and the cached credential.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
