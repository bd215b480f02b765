use crate::{
    cli::{actions::Action, globals::GlobalArgs},
    marquee,
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub globals: GlobalArgs,
}

/// Handle the server action
/// # Errors
/// Returns an error if the DSN is malformed or the server fails to start
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => {
            let dsn = Url::parse(args.dsn.expose_secret()).context("Invalid database DSN")?;

            if !matches!(dsn.scheme(), "postgres" | "postgresql") {
                return Err(anyhow!(
                    "Unsupported database scheme {}, expected postgres://",
                    dsn.scheme()
                ));
            }

            debug!("Global args: {:?}", args.globals);

            marquee::new(args.port, args.dsn, args.globals).await?;
        }
    }

    Ok(())
}
