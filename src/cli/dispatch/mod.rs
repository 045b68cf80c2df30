use crate::cli::{
    actions::{server::Args, Action},
    commands::{ARG_ENV_FILE, ARG_LOG_FILE, ARG_PORT},
};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Level;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches, verbosity: Option<Level>) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let env_file = matches
        .get_one::<PathBuf>(ARG_ENV_FILE)
        .cloned()
        .context("missing required argument: --env-file")?;
    let log_file = matches
        .get_one::<PathBuf>(ARG_LOG_FILE)
        .cloned()
        .context("missing required argument: --log-file")?;

    Ok(Action::Server(Args {
        port,
        env_file,
        log_file,
        verbosity,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_builds_server_action() {
        let matches = crate::cli::commands::new().get_matches_from(vec![
            "webfinance",
            "--port",
            "8443",
            "--env-file",
            "config/.env",
            "--log-file",
            "logs/finance.log",
        ]);

        let Action::Server(args) = handler(&matches, Some(Level::INFO)).unwrap();
        assert_eq!(args.port, 8443);
        assert_eq!(args.env_file, PathBuf::from("config/.env"));
        assert_eq!(args.log_file, PathBuf::from("logs/finance.log"));
        assert_eq!(args.verbosity, Some(Level::INFO));
    }
}
