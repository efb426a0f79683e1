//! Outbound calls to the backend API.
//!
//! Every request goes through [`RequestAuthenticator`], which attaches the
//! tenant Bearer token. Handlers never build backend requests themselves.

mod authenticator;
mod client;

pub use authenticator::RequestAuthenticator;
pub use client::{
    build_http_client, BackendClient, BackendError, BackendUser, GraphQlReply, GraphQlRequest,
    LoginResponse, SignupResponse, USER_TOKEN_HEADER,
};

use url::Url;

/// Join `path` onto `base`, keeping any path prefix `base` already carries.
///
/// `Url::join` would drop the last segment of a base without a trailing slash.
///
/// # Errors
/// Returns `url::ParseError` if the combined URL is invalid.
pub fn endpoint_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_keeps_prefix() -> Result<(), url::ParseError> {
        let base = Url::parse("https://api.example.com/v1")?;
        assert_eq!(
            endpoint_url(&base, "/auth/token")?.as_str(),
            "https://api.example.com/v1/auth/token"
        );

        let base = Url::parse("https://api.example.com/")?;
        assert_eq!(
            endpoint_url(&base, "tenant")?.as_str(),
            "https://api.example.com/tenant"
        );
        Ok(())
    }
}
