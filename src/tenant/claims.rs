//! Unverified JWT payload decoding.
//!
//! Only the payload segment is base64url-decoded and parsed; the signature is
//! NOT checked. Claims read here are used for the tenant-consistency check and
//! for expiry fallbacks, never to grant access on their own.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json payload")]
    Json,
}

/// The subset of JWT claims this service reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub tenant_id: Option<String>,
    pub sub: Option<String>,
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Expiry as a timestamp, if the `exp` claim is present and in range.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

/// Decode the payload of a compact JWT without verifying its signature.
///
/// # Errors
/// Returns `ClaimsError` if the token is not three dot-separated segments, or
/// the payload is not base64url-encoded JSON.
pub fn decode_unverified(token: &str) -> Result<TokenClaims, ClaimsError> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ClaimsError::TokenFormat);
    };

    // Some issuers keep the `=` padding; strip it before decoding.
    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('='))
        .map_err(|_| ClaimsError::Base64)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|_| ClaimsError::Json)?;

    Ok(TokenClaims {
        tenant_id: claim_as_string(&value, "tenantId"),
        sub: claim_as_string(&value, "sub"),
        exp: value.get("exp").and_then(Value::as_i64),
    })
}

/// Read the `tenantId` claim, normalised to a string.
#[must_use]
pub fn tenant_id(token: &str) -> Option<String> {
    decode_unverified(token).ok().and_then(|claims| claims.tenant_id)
}

// Backends emit ids either as JSON numbers or strings; compare them as text.
fn claim_as_string(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Build an unsigned compact JWT carrying `payload`.
    pub(crate) fn unsigned_jwt(payload: &Value) -> String {
        let header = Base64UrlUnpadded::encode_string(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = Base64UrlUnpadded::encode_string(payload.to_string().as_bytes());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_numeric_tenant_id() {
        let token = unsigned_jwt(&json!({"tenantId": 1, "sub": "42", "exp": 1_900_000_000}));
        let claims = decode_unverified(&token).unwrap();
        assert_eq!(claims.tenant_id.as_deref(), Some("1"));
        assert_eq!(claims.sub.as_deref(), Some("42"));
        assert_eq!(claims.exp, Some(1_900_000_000));
        assert_eq!(
            claims.expires_at().map(|at| at.timestamp()),
            Some(1_900_000_000)
        );
    }

    #[test]
    fn numeric_and_string_tenant_ids_compare_equal() {
        let numeric = unsigned_jwt(&json!({"tenantId": 7}));
        let text = unsigned_jwt(&json!({"tenantId": "7"}));
        assert_eq!(tenant_id(&numeric), tenant_id(&text));
    }

    #[test]
    fn missing_tenant_claim_is_none() {
        let token = unsigned_jwt(&json!({"sub": "user"}));
        assert_eq!(tenant_id(&token), None);
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert_eq!(decode_unverified("T"), Err(ClaimsError::TokenFormat));
        assert_eq!(decode_unverified("a.b.c.d"), Err(ClaimsError::TokenFormat));
        assert_eq!(decode_unverified("a.!!!.c"), Err(ClaimsError::Base64));
        let not_json = Base64UrlUnpadded::encode_string(b"not json");
        assert_eq!(
            decode_unverified(&format!("a.{not_json}.c")),
            Err(ClaimsError::Json)
        );
    }

    #[test]
    fn tolerates_padded_payload() {
        let body = base64ct::Base64Url::encode_string(br#"{"tenantId":"acme"}"#);
        let token = format!("h.{body}.s");
        assert_eq!(tenant_id(&token).as_deref(), Some("acme"));
    }
}
