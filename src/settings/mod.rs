//! Process settings, resolved once at startup.
//!
//! Values come from exactly one source: the local `.env` file if it exists,
//! otherwise the Secret Manager secret named by `SETTINGS_NAME` in the project
//! named by `GOOGLE_CLOUD_PROJECT`. With neither, startup fails.
//!
//! Variables already present in the process environment take precedence over
//! the loaded values. The result is an immutable [`Settings`] that is shared by
//! reference with the rest of the process.

pub mod database;
pub mod env_file;
pub mod hosts;
pub mod provider;
pub mod secret_manager;

pub use database::DatabaseSettings;
pub use hosts::HostPolicy;
pub use provider::{ConfigProvider, Loaded, ProviderChain, Source};

use secrecy::SecretString;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

pub const ENV_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_SETTINGS_NAME: &str = "SETTINGS_NAME";
pub const ENV_METADATA_HOST: &str = "GCE_METADATA_HOST";
pub const ENV_DEPLOYMENT_URLS: &str = "APPENGINE_URL";
pub const ENV_CLOUD_SQL_PROXY: &str = "USE_CLOUD_SQL_AUTH_PROXY";

/// Keys every source must define.
pub const REQUIRED_KEYS: [&str; 10] = [
    "SECRET_KEY",
    "DATABASE_URL",
    "EMAIL_BACKEND",
    "EMAIL_USE_TLS",
    "EMAIL_PORT",
    "EMAIL_HOST",
    "EMAIL_HOST_USER",
    "EMAIL_HOST_PASSWORD",
    "SERVER_EMAIL",
    "DEFAULT_FROM_EMAIL",
];

/// Rotation threshold of the local log file.
pub const LOG_FILE_MAX_BYTES: usize = 50 * 1024 * 1024;
/// Rotated log files kept next to the active one.
pub const LOG_FILE_BACKUPS: usize = 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no configuration source available: neither {} detected", .tried.join(" nor "))]
    NoSource { tried: Vec<String> },
    #[error("failed to load settings from {provider}: {message}")]
    Provider { provider: String, message: String },
    #[error("missing required settings: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Snapshot of the process environment taken at startup.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Non-empty value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn get_raw(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Paths that are fixed per deployment rather than read from the source.
#[derive(Clone, Debug)]
pub struct BootstrapOptions {
    pub env_file: PathBuf,
    pub log_file: PathBuf,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(".env"),
            log_file: PathBuf::from("webfinance.log"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailBackend {
    /// Write messages to the log instead of delivering them.
    Console,
    Smtp,
}

impl FromStr for MailBackend {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "smtp" => Ok(Self::Smtp),
            other => Err(Error::InvalidValue {
                key: "EMAIL_BACKEND",
                reason: format!("unknown backend {other}, expected smtp or console"),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmailSettings {
    pub backend: MailBackend,
    pub use_tls: bool,
    pub host: String,
    pub port: u16,
    pub host_user: String,
    pub host_password: SecretString,
    pub server_email: String,
    pub default_from_email: String,
}

/// Where application logs go besides the console.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    /// Structured JSON on stdout, collected by Cloud Logging.
    Cloud { project: String },
    /// Size-bounded rotating file.
    LocalFile {
        path: PathBuf,
        max_bytes: usize,
        backups: usize,
    },
}

impl LogSink {
    fn select(values: &ConfigValues, log_file: &Path) -> Self {
        match values.get(ENV_CLOUD_PROJECT) {
            Some(project) => Self::Cloud {
                project: project.to_string(),
            },
            None => Self::LocalFile {
                path: log_file.to_path_buf(),
                max_bytes: LOG_FILE_MAX_BYTES,
                backups: LOG_FILE_BACKUPS,
            },
        }
    }
}

/// Source values layered under the process environment.
struct ConfigValues<'a> {
    source: &'a BTreeMap<String, String>,
    env: &'a Environment,
}

impl ConfigValues<'_> {
    fn raw(&self, key: &str) -> Option<&str> {
        self.env
            .get_raw(key)
            .or_else(|| self.source.get(key).map(String::as_str))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.raw(key).filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<&str, Error> {
        self.raw(key).ok_or(Error::MissingKeys(vec![key]))
    }

    fn missing(&self) -> Vec<&'static str> {
        REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| self.raw(key).is_none())
            .collect()
    }

    fn bool(&self, key: &str) -> bool {
        self.raw(key).is_some_and(parse_bool)
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.raw(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Truthy spellings accepted for boolean settings.
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "ok" | "y" | "yes" | "1"
    )
}

/// The resolved, immutable configuration of the process.
#[derive(Clone, Debug)]
pub struct Settings {
    pub source: Source,
    pub secret_key: SecretString,
    pub debug: bool,
    pub hosts: HostPolicy,
    pub database: DatabaseSettings,
    pub email: EmailSettings,
    pub logging: LogSink,
}

impl Settings {
    /// Resolve settings through the standard provider chain.
    ///
    /// # Errors
    /// Fails when no source is available, the source cannot be read, or the
    /// values are incomplete or invalid.
    pub async fn bootstrap(options: &BootstrapOptions, env: &Environment) -> Result<Self, Error> {
        let chain = ProviderChain::standard(&options.env_file, env);
        Self::resolve(&chain, options, env).await
    }

    /// Resolve settings through an explicit provider chain.
    ///
    /// # Errors
    /// Same as [`Settings::bootstrap`].
    pub async fn resolve(
        chain: &ProviderChain,
        options: &BootstrapOptions,
        env: &Environment,
    ) -> Result<Self, Error> {
        let loaded = chain.resolve().await?;
        Self::from_loaded(loaded, options, env)
    }

    /// Validate and assemble the snapshot from already loaded values.
    ///
    /// # Errors
    /// Returns [`Error::MissingKeys`] listing every absent required key, or
    /// [`Error::InvalidValue`] for values that do not parse.
    pub fn from_loaded(
        loaded: Loaded,
        options: &BootstrapOptions,
        env: &Environment,
    ) -> Result<Self, Error> {
        let values = ConfigValues {
            source: &loaded.values,
            env,
        };

        let missing = values.missing();
        if !missing.is_empty() {
            return Err(Error::MissingKeys(missing));
        }

        let deployment_urls = values.list(ENV_DEPLOYMENT_URLS);
        let hosts = HostPolicy::from_deployment_urls(&deployment_urls);

        let mut database = DatabaseSettings::parse(values.required("DATABASE_URL")?)?;
        if values.get(ENV_CLOUD_SQL_PROXY).is_some() {
            database = database.via_local_proxy()?;
        }

        let port = values.required("EMAIL_PORT")?;
        let email = EmailSettings {
            backend: values.required("EMAIL_BACKEND")?.parse()?,
            use_tls: values.bool("EMAIL_USE_TLS"),
            host: values.required("EMAIL_HOST")?.to_string(),
            port: port.trim().parse().map_err(|_| Error::InvalidValue {
                key: "EMAIL_PORT",
                reason: format!("{port} is not a port number"),
            })?,
            host_user: values.required("EMAIL_HOST_USER")?.to_string(),
            host_password: SecretString::from(values.required("EMAIL_HOST_PASSWORD")?.to_string()),
            server_email: values.required("SERVER_EMAIL")?.to_string(),
            default_from_email: values.required("DEFAULT_FROM_EMAIL")?.to_string(),
        };

        Ok(Self {
            secret_key: SecretString::from(values.required("SECRET_KEY")?.to_string()),
            debug: values.bool("DEBUG"),
            hosts,
            database,
            email,
            logging: LogSink::select(&values, &options.log_file),
            source: loaded.source,
        })
    }
}
