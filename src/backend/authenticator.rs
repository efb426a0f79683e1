use crate::tenant::{TokenError, TokenManager};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    Request,
};
use tracing::{debug, instrument};

/// Attaches `Authorization: Bearer <tenant token>` to outbound requests.
///
/// The token-exchange request itself is left untouched, as is any request
/// whose caller already pinned an `Authorization` header.
#[derive(Clone, Debug)]
pub struct RequestAuthenticator {
    tokens: TokenManager,
}

impl RequestAuthenticator {
    #[must_use]
    pub fn new(tokens: TokenManager) -> Self {
        Self { tokens }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// # Errors
    /// Returns `TokenError` when no Bearer token can be obtained; the request
    /// must then be abandoned.
    #[instrument(skip_all, fields(path = %request.url().path()))]
    pub async fn authorize(&self, mut request: Request) -> Result<Request, TokenError> {
        if self.is_exchange(&request) {
            return Ok(request);
        }

        if request.headers().contains_key(AUTHORIZATION) {
            debug!("keeping pinned authorization header");
            return Ok(request);
        }

        let token = self.tokens.get_token().await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            TokenError::InvalidResponse("token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        Ok(request)
    }

    fn is_exchange(&self, request: &Request) -> bool {
        let exchange = self.tokens.exchange_url();
        request.url().path() == exchange.path()
            && request.url().host_str() == exchange.host_str()
            && request.url().port_or_known_default() == exchange.port_or_known_default()
    }
}
