use crate::session::SameSite;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_COOKIE_NAME: &str = "session-cookie-name";
pub const ARG_COOKIE_INSECURE: &str = "session-cookie-insecure";
pub const ARG_COOKIE_SAME_SITE: &str = "session-cookie-same-site";
pub const ARG_SESSION_TTL: &str = "session-ttl-seconds";
pub const ARG_REFRESH_THRESHOLD: &str = "session-refresh-threshold-seconds";
pub const ARG_REAPER_INTERVAL: &str = "session-reaper-interval-seconds";
pub const ARG_LOGIN_ATTEMPT_LIMIT: &str = "login-attempt-limit";
pub const ARG_LOGIN_ATTEMPT_WINDOW: &str = "login-attempt-window-seconds";

#[derive(Debug)]
pub struct Options {
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub ttl: Duration,
    pub refresh_threshold: Duration,
    /// `None` disables the reaper.
    pub reaper_interval: Option<Duration>,
    /// `None` disables login rate limiting.
    pub login_attempt_limit: Option<usize>,
    pub login_attempt_window: Duration,
}

impl Options {
    /// Parse session and login options from CLI matches.
    ///
    /// # Errors
    /// Returns an error if the cookie name is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let seconds = |id: &str| Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(0));

        let cookie_name = matches
            .get_one::<String>(ARG_COOKIE_NAME)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_COOKIE_NAME}"))?;

        let reaper_interval = Some(seconds(ARG_REAPER_INTERVAL)).filter(|d| !d.is_zero());
        let login_attempt_limit = matches
            .get_one::<usize>(ARG_LOGIN_ATTEMPT_LIMIT)
            .copied()
            .filter(|limit| *limit > 0);

        Ok(Self {
            cookie_name,
            cookie_secure: !matches.get_flag(ARG_COOKIE_INSECURE),
            cookie_same_site: matches
                .get_one::<SameSite>(ARG_COOKIE_SAME_SITE)
                .copied()
                .unwrap_or_default(),
            ttl: seconds(ARG_SESSION_TTL),
            refresh_threshold: seconds(ARG_REFRESH_THRESHOLD),
            reaper_interval,
            login_attempt_limit,
            login_attempt_window: seconds(ARG_LOGIN_ATTEMPT_WINDOW),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_cookie_args(command);
    let command = with_lifetime_args(command);
    with_login_args(command)
}

fn with_cookie_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the session cookie")
                .env("PORTIER_SESSION_COOKIE_NAME")
                .default_value("portier_session"),
        )
        .arg(
            Arg::new(ARG_COOKIE_INSECURE)
                .long(ARG_COOKIE_INSECURE)
                .help("Omit the Secure attribute (local development over plain HTTP)")
                .env("PORTIER_SESSION_COOKIE_INSECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_COOKIE_SAME_SITE)
                .long(ARG_COOKIE_SAME_SITE)
                .help("SameSite attribute: strict or lax")
                .env("PORTIER_SESSION_COOKIE_SAME_SITE")
                .default_value("lax")
                .value_parser(|value: &str| value.parse::<SameSite>()),
        )
}

fn with_lifetime_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session cookie Max-Age in seconds")
                .env("PORTIER_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_THRESHOLD)
                .long(ARG_REFRESH_THRESHOLD)
                .help("Flag sessions whose user token expires within this many seconds")
                .env("PORTIER_SESSION_REFRESH_THRESHOLD_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REAPER_INTERVAL)
                .long(ARG_REAPER_INTERVAL)
                .help("Purge expired sessions every N seconds (0 disables)")
                .env("PORTIER_SESSION_REAPER_INTERVAL_SECONDS")
                .default_value("0")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_login_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_ATTEMPT_LIMIT)
                .long(ARG_LOGIN_ATTEMPT_LIMIT)
                .help("Login attempts allowed per IP and per email within the window (0 disables)")
                .env("PORTIER_LOGIN_ATTEMPT_LIMIT")
                .default_value("0")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_LOGIN_ATTEMPT_WINDOW)
                .long(ARG_LOGIN_ATTEMPT_WINDOW)
                .help("Login rate limit window in seconds")
                .env("PORTIER_LOGIN_ATTEMPT_WINDOW_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_from(args: &[&str]) -> ArgMatches {
        with_args(Command::new("portier")).get_matches_from(args)
    }

    #[test]
    fn defaults() -> anyhow::Result<()> {
        temp_env::with_vars_unset(
            [
                "PORTIER_SESSION_COOKIE_NAME",
                "PORTIER_SESSION_COOKIE_INSECURE",
                "PORTIER_SESSION_COOKIE_SAME_SITE",
                "PORTIER_SESSION_REAPER_INTERVAL_SECONDS",
                "PORTIER_LOGIN_ATTEMPT_LIMIT",
            ],
            || {
                let options = Options::parse(&matches_from(&["portier"]))?;
                assert_eq!(options.cookie_name, "portier_session");
                assert!(options.cookie_secure);
                assert_eq!(options.cookie_same_site, SameSite::Lax);
                assert_eq!(options.ttl, Duration::from_secs(86_400));
                assert_eq!(options.refresh_threshold, Duration::from_secs(300));
                assert_eq!(options.reaper_interval, None);
                assert_eq!(options.login_attempt_limit, None);
                assert_eq!(options.login_attempt_window, Duration::from_secs(600));
                Ok(())
            },
        )
    }

    #[test]
    fn explicit_values() -> anyhow::Result<()> {
        let options = Options::parse(&matches_from(&[
            "portier",
            "--session-cookie-name",
            "sid",
            "--session-cookie-insecure",
            "--session-cookie-same-site",
            "Strict",
            "--session-reaper-interval-seconds",
            "60",
            "--login-attempt-limit",
            "5",
        ]))?;
        assert_eq!(options.cookie_name, "sid");
        assert!(!options.cookie_secure);
        assert_eq!(options.cookie_same_site, SameSite::Strict);
        assert_eq!(options.reaper_interval, Some(Duration::from_secs(60)));
        assert_eq!(options.login_attempt_limit, Some(5));
        Ok(())
    }

    #[test]
    fn rejects_unknown_same_site() {
        let result = with_args(Command::new("portier")).try_get_matches_from([
            "portier",
            "--session-cookie-same-site",
            "none",
        ]);
        assert!(result.is_err());
    }
}
