use crate::{
    backend::{build_http_client, endpoint_url, BackendClient, RequestAuthenticator},
    cli::telemetry,
    portier::{
        self,
        rate_limit::{NoopRateLimiter, RateLimiter, WindowRateLimiter},
        AppState,
    },
    session::{CookieConfig, MemoryStore, SameSite, SessionCodec, SessionManager},
    tenant::{TokenManager, TOKEN_EXCHANGE_PATH},
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub api_url: Url,
    pub api_key: SecretString,
    pub graphql_url: Url,
    pub backend_timeout: Duration,
    pub token_refresh_margin: Duration,
    pub tenant_validation_timeout: Duration,
    pub skip_tenant_validation: bool,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub session_ttl: Duration,
    pub session_refresh_threshold: Duration,
    pub session_reaper_interval: Option<Duration>,
    pub login_attempt_limit: Option<usize>,
    pub login_attempt_window: Duration,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the HTTP client cannot be built, tenant validation
/// fails or times out, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let client =
        build_http_client(args.backend_timeout).context("Failed to build HTTP client")?;

    let exchange_url = endpoint_url(&args.api_url, TOKEN_EXCHANGE_PATH)
        .context("Failed to build token exchange URL")?;
    let tokens = TokenManager::new(
        client.clone(),
        exchange_url,
        args.api_key,
        args.token_refresh_margin,
    );

    let backend = BackendClient::new(
        client,
        args.api_url.clone(),
        args.graphql_url,
        RequestAuthenticator::new(tokens.clone()),
    );

    if args.skip_tenant_validation {
        info!("Tenant validation skipped");
    } else {
        validate_tenant(&backend, args.tenant_validation_timeout).await?;
    }

    let sessions = SessionManager::new(Arc::new(MemoryStore::new()))
        .with_refresh_threshold(args.session_refresh_threshold);
    let reaper = args
        .session_reaper_interval
        .map(|interval| sessions.spawn_reaper(interval));

    let codec = SessionCodec::new(
        CookieConfig::new()
            .with_name(args.cookie_name)
            .with_secure(args.cookie_secure)
            .with_same_site(args.cookie_same_site)
            .with_max_age(args.session_ttl),
    );

    let rate_limiter: Arc<dyn RateLimiter> = match args.login_attempt_limit {
        Some(limit) => Arc::new(WindowRateLimiter::new(limit, args.login_attempt_window)),
        None => Arc::new(NoopRateLimiter),
    };

    let state = Arc::new(AppState::new(tokens, sessions, codec, backend, rate_limiter));

    debug!("Backend API: {}", args.api_url);

    let result = portier::new(args.port, state).await;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    telemetry::shutdown_tracer();

    result
}

/// Exchange the API key and fetch the tenant record, racing `timeout`.
async fn validate_tenant(backend: &BackendClient, timeout: Duration) -> Result<()> {
    let tenant = tokio::time::timeout(timeout, backend.validate_tenant())
        .await
        .map_err(|_| anyhow!("Tenant validation timed out after {}s", timeout.as_secs()))?
        .context("Tenant validation failed")?;

    let tenant_id = tenant
        .get("id")
        .or_else(|| tenant.get("tenantId"))
        .map(ToString::to_string)
        .unwrap_or_default();
    info!(%tenant_id, "Tenant validated");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    async fn backend_for(server: &MockServer) -> Result<BackendClient> {
        let api_url = Url::parse(&server.uri())?;
        let client = build_http_client(Duration::from_secs(5))?;
        let tokens = TokenManager::new(
            client.clone(),
            endpoint_url(&api_url, TOKEN_EXCHANGE_PATH)?,
            SecretString::from("api-key".to_string()),
            Duration::from_secs(300),
        );
        Ok(BackendClient::new(
            client,
            api_url.clone(),
            endpoint_url(&api_url, "/graphql")?,
            RequestAuthenticator::new(tokens),
        ))
    }

    fn exchange_ok() -> Mock {
        Mock::given(method("POST"))
            .and(path(TOKEN_EXCHANGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tenant-token",
                "expiresIn": 3600
            })))
    }

    #[tokio::test]
    async fn validation_succeeds() -> Result<()> {
        let server = MockServer::start().await;
        exchange_ok().expect(1).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/tenant"))
            .and(header("authorization", "Bearer tenant-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "t1" })))
            .expect(1)
            .mount(&server)
            .await;

        validate_tenant(&backend_for(&server).await?, Duration::from_secs(5)).await
    }

    #[tokio::test]
    async fn rejected_key_fails() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_EXCHANGE_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = validate_tenant(&backend_for(&server).await?, Duration::from_secs(5)).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn slow_backend_times_out() -> Result<()> {
        let server = MockServer::start().await;
        exchange_ok().mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/tenant"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "t1" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let result =
            validate_tenant(&backend_for(&server).await?, Duration::from_millis(200)).await;
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("timed out"));
        }
        Ok(())
    }
}
