//! Maps validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{backend, session, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let backend_opts = backend::Options::parse(matches)?;
    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        api_url: backend_opts.api_url,
        api_key: backend_opts.api_key,
        graphql_url: backend_opts.graphql_url,
        backend_timeout: backend_opts.timeout,
        token_refresh_margin: backend_opts.token_refresh_margin,
        tenant_validation_timeout: backend_opts.tenant_validation_timeout,
        skip_tenant_validation: backend_opts.skip_tenant_validation,
        cookie_name: session_opts.cookie_name,
        cookie_secure: session_opts.cookie_secure,
        cookie_same_site: session_opts.cookie_same_site,
        session_ttl: session_opts.ttl,
        session_refresh_threshold: session_opts.refresh_threshold,
        session_reaper_interval: session_opts.reaper_interval,
        login_attempt_limit: session_opts.login_attempt_limit,
        login_attempt_window: session_opts.login_attempt_window,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_required() {
        temp_env::with_vars(
            [
                ("PORTIER_API_URL", Some("https://api.example.com")),
                ("PORTIER_API_KEY", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["portier"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err
                        .to_string()
                        .contains("missing required argument: --api-key"));
                }
            },
        );
    }

    #[test]
    fn server_action() {
        temp_env::with_vars(
            [
                ("PORTIER_API_URL", Some("https://api.example.com")),
                ("PORTIER_API_KEY", Some("api-key")),
                ("PORTIER_PORT", None),
                ("PORTIER_GRAPHQL_URL", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["portier"]);
                match handler(&matches) {
                    Ok(Action::Server(args)) => {
                        assert_eq!(args.port, 8080);
                        assert_eq!(args.graphql_url.as_str(), "https://api.example.com/graphql");
                    }
                    Err(err) => panic!("unexpected error: {err}"),
                }
            },
        );
    }
}
