//! User-level sessions.
//!
//! A session binds a random opaque id, carried by an `HttpOnly` cookie, to the
//! user token returned by the backend at login. The browser never sees the
//! user token.

mod cookie;
mod manager;
mod model;
mod store;

pub use cookie::{
    CookieConfig, SameSite, SessionCodec, SessionCookie, DEFAULT_COOKIE_NAME, DEFAULT_SESSION_TTL,
};
pub use manager::{SessionError, SessionManager, DEFAULT_REFRESH_THRESHOLD};
pub use model::{NewSession, Session, SessionValidation};
pub use store::{MemoryStore, SessionStore, StoreError};
