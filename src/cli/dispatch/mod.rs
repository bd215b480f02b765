//! Map validated CLI arguments to the action the binary runs.

use crate::cli::{
    actions::{server::Args, Action},
    commands::{ARG_DSN, ARG_NO_BOOTSTRAP_ADMIN, ARG_PORT, ARG_SECURE_COOKIES, ARG_SESSION_TTL},
    globals::GlobalArgs,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let mut globals = GlobalArgs::new()
        .with_secure_cookies(matches.get_flag(ARG_SECURE_COOKIES))
        .with_bootstrap_admin(!matches.get_flag(ARG_NO_BOOTSTRAP_ADMIN));

    if let Some(ttl) = matches.get_one::<u64>(ARG_SESSION_TTL) {
        globals = globals.with_session_ttl_seconds(*ttl);
    }

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        globals,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars(
            [
                ("MARQUEE_DSN", None::<&str>),
                ("MARQUEE_SECURE_COOKIES", None::<&str>),
                ("MARQUEE_NO_BOOTSTRAP_ADMIN", None::<&str>),
                ("MARQUEE_SESSION_TTL", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec![
                    "marquee",
                    "--dsn",
                    "postgres://localhost/marquee",
                    "--port",
                    "9000",
                    "--session-ttl",
                    "900",
                    "--no-bootstrap-admin",
                ]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected server action");
                };
                assert_eq!(args.port, 9000);
                assert_eq!(args.dsn.expose_secret(), "postgres://localhost/marquee");
                assert_eq!(args.globals.session_ttl_seconds, 900);
                assert!(!args.globals.secure_cookies);
                assert!(!args.globals.bootstrap_admin);
            },
        );
    }
}
