//! Session id to HTTP cookie mapping.
//!
//! The cookie carries the session id and nothing else.

use std::{fmt, str::FromStr, time::Duration};

pub const DEFAULT_COOKIE_NAME: &str = "portier_session";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
}

impl SameSite {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            _ => Err(format!("invalid SameSite value: {value}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    name: String,
    secure: bool,
    same_site: SameSite,
    max_age: Duration,
    path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            secure: true,
            same_site: SameSite::default(),
            max_age: DEFAULT_SESSION_TTL,
            path: "/".to_string(),
        }
    }
}

impl CookieConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age: Option<u64>,
    pub path: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionCodec {
    config: CookieConfig,
}

impl SessionCodec {
    #[must_use]
    pub fn new(config: CookieConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CookieConfig {
        &self.config
    }

    #[must_use]
    pub fn create_session_cookie(&self, session_id: &str) -> SessionCookie {
        self.cookie(session_id.to_string(), self.config.max_age.as_secs())
    }

    /// Cookie that makes the browser drop the session cookie.
    #[must_use]
    pub fn create_logout_cookie(&self) -> SessionCookie {
        self.cookie(String::new(), 0)
    }

    /// Render a `Set-Cookie` header value.
    #[must_use]
    pub fn format_set_cookie_header(&self, cookie: &SessionCookie) -> String {
        let mut parts = vec![format!("{}={}", cookie.name, cookie.value)];

        if let Some(max_age) = cookie.max_age {
            parts.push(format!("Max-Age={max_age}"));
        }
        if let Some(path) = &cookie.path {
            parts.push(format!("Path={path}"));
        }
        if cookie.http_only {
            parts.push("HttpOnly".to_string());
        }
        if cookie.secure {
            parts.push("Secure".to_string());
        }
        if let Some(same_site) = cookie.same_site {
            parts.push(format!("SameSite={same_site}"));
        }

        parts.join("; ")
    }

    /// Extract the session id from a `Cookie` request header.
    #[must_use]
    pub fn parse_session_id_from_cookie(&self, header: Option<&str>) -> Option<String> {
        header?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == self.config.name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn cookie(&self, value: String, max_age: u64) -> SessionCookie {
        SessionCookie {
            name: self.config.name.clone(),
            value,
            max_age: Some(max_age),
            path: Some(self.config.path.clone()),
            http_only: true,
            secure: self.config.secure,
            same_site: Some(self.config.same_site),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_attributes_in_order() {
        let codec = SessionCodec::default();
        let cookie = codec.create_session_cookie("abc");
        assert_eq!(
            codec.format_set_cookie_header(&cookie),
            "portier_session=abc; Max-Age=86400; Path=/; HttpOnly; Secure; SameSite=Lax"
        );
    }

    #[test]
    fn omits_absent_attributes() {
        let codec = SessionCodec::new(CookieConfig::new().with_secure(false));
        let cookie = SessionCookie {
            max_age: None,
            path: None,
            same_site: None,
            ..codec.create_session_cookie("abc")
        };
        assert_eq!(
            codec.format_set_cookie_header(&cookie),
            "portier_session=abc; HttpOnly"
        );
    }

    #[test]
    fn parse_of_formatted_cookie_yields_id() {
        let codec = SessionCodec::new(
            CookieConfig::new()
                .with_name("sid".to_string())
                .with_same_site(SameSite::Strict),
        );
        let id = "Zm9vYmFyLWJhei1xdXV4LXNlc3Npb24taWQtMzJieXRl";
        let header = codec.format_set_cookie_header(&codec.create_session_cookie(id));
        let request_cookie = header.split(';').next();
        assert_eq!(
            codec.parse_session_id_from_cookie(request_cookie).as_deref(),
            Some(id)
        );
    }

    #[test]
    fn parse_matches_name_exactly() {
        let codec = SessionCodec::default();
        let header = "theme=dark; portier_session_old=stale;portier_session=live ; other=1";
        assert_eq!(
            codec.parse_session_id_from_cookie(Some(header)).as_deref(),
            Some("live")
        );
        assert_eq!(
            codec.parse_session_id_from_cookie(Some("PORTIER_SESSION=x")),
            None
        );
    }

    #[test]
    fn parse_missing_or_empty_is_none() {
        let codec = SessionCodec::default();
        assert_eq!(codec.parse_session_id_from_cookie(None), None);
        assert_eq!(codec.parse_session_id_from_cookie(Some("")), None);
        assert_eq!(codec.parse_session_id_from_cookie(Some("flag; a=b")), None);
        assert_eq!(
            codec.parse_session_id_from_cookie(Some("portier_session=")),
            None
        );
    }

    #[test]
    fn logout_cookie_expires_immediately() {
        let codec = SessionCodec::new(CookieConfig::new().with_same_site(SameSite::Strict));
        let cookie = codec.create_logout_cookie();
        assert_eq!(cookie.value, "");
        assert_eq!(
            codec.format_set_cookie_header(&cookie),
            "portier_session=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=Strict"
        );
    }

    #[test]
    fn same_site_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<SameSite>(), Ok(SameSite::Strict));
        assert_eq!("lax".parse::<SameSite>(), Ok(SameSite::Lax));
        assert!("none".parse::<SameSite>().is_err());
    }
}
