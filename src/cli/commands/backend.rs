use crate::backend::endpoint_url;
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const ARG_API_URL: &str = "api-url";
pub const ARG_API_KEY: &str = "api-key";
pub const ARG_GRAPHQL_URL: &str = "graphql-url";
pub const ARG_BACKEND_TIMEOUT: &str = "backend-timeout-seconds";
pub const ARG_TOKEN_REFRESH_MARGIN: &str = "token-refresh-margin-seconds";
pub const ARG_TENANT_VALIDATION_TIMEOUT: &str = "tenant-validation-timeout-seconds";
pub const ARG_SKIP_TENANT_VALIDATION: &str = "skip-tenant-validation";

/// Backend endpoints and tenant credentials.
#[derive(Debug)]
pub struct Options {
    pub api_url: Url,
    pub api_key: SecretString,
    pub graphql_url: Url,
    pub timeout: Duration,
    pub token_refresh_margin: Duration,
    pub tenant_validation_timeout: Duration,
    pub skip_tenant_validation: bool,
}

impl Options {
    /// Parse backend options from CLI matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or a URL is invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_required = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let seconds = |id: &str| Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(0));

        let api_url = read_required(ARG_API_URL)?;
        let api_url =
            Url::parse(&api_url).with_context(|| format!("invalid --{ARG_API_URL}: {api_url}"))?;
        let api_key = SecretString::from(read_required(ARG_API_KEY)?);

        let graphql_url = match matches
            .get_one::<String>(ARG_GRAPHQL_URL)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            Some(value) => {
                Url::parse(value).with_context(|| format!("invalid --{ARG_GRAPHQL_URL}: {value}"))?
            }
            None => endpoint_url(&api_url, "/graphql")
                .with_context(|| format!("invalid --{ARG_API_URL}: {api_url}"))?,
        };

        Ok(Self {
            api_url,
            api_key,
            graphql_url,
            timeout: seconds(ARG_BACKEND_TIMEOUT),
            token_refresh_margin: seconds(ARG_TOKEN_REFRESH_MARGIN),
            tenant_validation_timeout: seconds(ARG_TENANT_VALIDATION_TIMEOUT),
            skip_tenant_validation: matches.get_flag(ARG_SKIP_TENANT_VALIDATION),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_endpoint_args(command);
    with_token_args(command)
}

fn with_endpoint_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_API_URL)
                .long(ARG_API_URL)
                .help("Backend API base URL")
                .env("PORTIER_API_URL"),
        )
        .arg(
            Arg::new(ARG_API_KEY)
                .long(ARG_API_KEY)
                .help("Tenant API key exchanged for Bearer tokens")
                .env("PORTIER_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_GRAPHQL_URL)
                .long(ARG_GRAPHQL_URL)
                .help("GraphQL endpoint (default: <api-url>/graphql)")
                .env("PORTIER_GRAPHQL_URL"),
        )
        .arg(
            Arg::new(ARG_BACKEND_TIMEOUT)
                .long(ARG_BACKEND_TIMEOUT)
                .help("Timeout for backend requests in seconds")
                .env("PORTIER_BACKEND_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_REFRESH_MARGIN)
                .long(ARG_TOKEN_REFRESH_MARGIN)
                .help("Refresh the tenant token when it expires within this many seconds")
                .env("PORTIER_TOKEN_REFRESH_MARGIN_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_TENANT_VALIDATION_TIMEOUT)
                .long(ARG_TENANT_VALIDATION_TIMEOUT)
                .help("Startup tenant validation timeout in seconds")
                .env("PORTIER_TENANT_VALIDATION_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SKIP_TENANT_VALIDATION)
                .long(ARG_SKIP_TENANT_VALIDATION)
                .help("Start without validating the API key against the backend")
                .env("PORTIER_SKIP_TENANT_VALIDATION")
                .action(ArgAction::SetTrue),
        )
}
