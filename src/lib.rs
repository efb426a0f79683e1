//! # Portier (tenant and user authentication gateway)
//!
//! `portier` sits between browsers and a backend API and authenticates two
//! independent principals on every outbound call:
//!
//! - **Tenant:** the deployed instance, identified by a static API key. The key
//!   is exchanged for a short-lived Bearer token which is cached in memory and
//!   renewed before it expires; concurrent callers share a single exchange.
//! - **User:** an end customer who logs in with email and password. The user
//!   token returned by the backend lives in a server-side session; the browser
//!   only ever holds an opaque, `HttpOnly` session cookie.
//!
//! ## GraphQL Proxy
//!
//! `POST /graphql` is forwarded with `Authorization: Bearer <tenant token>` and,
//! for a live session, `X-User-Token`. Before forwarding, the `tenantId` claims
//! of both tokens must match. Claims are decoded without signature
//! verification; the check guards against cross-tenant mixups and is not an
//! authentication step.
//!
//! ## Sessions
//!
//! Sessions expire together with their user token. Expiry is applied lazily on
//! read; an optional reaper task purges records nobody reads again.

pub mod backend;
pub mod cli;
pub mod portier;
pub mod proxy;
pub mod session;
pub mod tenant;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
