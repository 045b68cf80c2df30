use crate::{
    accounts::{AccountStore, AdminNotifier, EmailConfirmed, EventBus, PgAccountStore},
    api,
    cli::telemetry,
    email,
    settings::{BootstrapOptions, Environment, LogSink, Settings},
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub env_file: PathBuf,
    pub log_file: PathBuf,
    pub verbosity: Option<tracing::Level>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if settings cannot be resolved, logging or the mail
/// transport cannot be set up, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let options = BootstrapOptions {
        env_file: args.env_file,
        log_file: args.log_file,
    };

    let settings = Settings::bootstrap(&options, &Environment::from_process())
        .await
        .context("Could not resolve settings")?;

    telemetry::init(args.verbosity, &settings.logging)?;
    log_startup(args.port, &settings);
    debug!("Settings: {:?}", settings);

    let transport = email::transport_from_settings(&settings.email)?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect_lazy_with(settings.database.connect_options());

    let accounts: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(pool.clone()));

    let mut events = EventBus::<EmailConfirmed>::new();
    events.connect(Arc::new(AdminNotifier::new(
        accounts.clone(),
        transport,
        settings.email.default_from_email.clone(),
    )));

    api::serve(
        args.port,
        api::Services {
            settings: Arc::new(settings),
            accounts,
            events: Arc::new(events),
            pool,
        },
    )
    .await
}

fn log_startup(port: u16, settings: &Settings) {
    let sink = match &settings.logging {
        LogSink::Cloud { project } => format!("cloud logging ({project})"),
        LogSink::LocalFile { path, .. } => format!("file {}", path.display()),
    };
    let entries = [
        ("listen", format!("tcp:{port}")),
        ("settings", settings.source.to_string()),
        ("database", settings.database.to_string()),
        ("allowed_hosts", settings.hosts.allowed_hosts().join(", ")),
        ("email_backend", format!("{:?}", settings.email.backend)),
        ("log_sink", sink),
        ("debug", settings.debug.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "webfinance {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
        assert_eq!(short_commit(" unknown "), "unknown");
    }

    #[tokio::test]
    async fn test_execute_fails_without_settings_source() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            port: 0,
            env_file: dir.path().join("missing.env"),
            log_file: dir.path().join("webfinance.log"),
            verbosity: None,
        };

        let result = temp_env::async_with_vars(
            [("GOOGLE_CLOUD_PROJECT", None::<&str>)],
            execute(args),
        )
        .await;

        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("Could not resolve settings"));
        assert!(err.contains("no configuration source available"));
    }
}
