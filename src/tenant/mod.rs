//! Tenant-level credentials.
//!
//! The tenant is the deployed application instance. It authenticates with a
//! static API key which [`TokenManager`] exchanges for a short-lived Bearer
//! token; the token is attached to every backend call except the exchange
//! itself.

pub mod claims;
mod token;

pub use token::{BearerToken, TokenError, TokenManager, DEFAULT_REFRESH_MARGIN, TOKEN_EXCHANGE_PATH};
