//! Ordered chain of configuration sources. The first source that applies wins.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use super::{
    env_file,
    secret_manager::{SecretManagerClient, DEFAULT_API_BASE, DEFAULT_METADATA_HOST},
    Environment, Error, ENV_CLOUD_PROJECT, ENV_METADATA_HOST, ENV_SETTINGS_NAME,
};

/// Secret read when `SETTINGS_NAME` is not set.
pub const DEFAULT_SETTINGS_NAME: &str = "django_settings";

/// Where the active settings came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    EnvFile(PathBuf),
    SecretManager { project: String, secret: String },
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvFile(path) => write!(f, "env file {}", path.display()),
            Self::SecretManager { project, secret } => {
                write!(f, "secret manager projects/{project}/secrets/{secret}")
            }
        }
    }
}

/// Raw key/value pairs read from one source.
#[derive(Clone, Debug)]
pub struct Loaded {
    pub source: Source,
    pub values: BTreeMap<String, String>,
}

#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Human readable description used when no provider applies.
    fn describe(&self) -> String;

    /// `Ok(None)` when this provider does not apply to the current process.
    async fn load(&self) -> Result<Option<Loaded>>;
}

/// Local `.env` style file.
#[derive(Clone, Debug)]
pub struct EnvFileProvider {
    path: PathBuf,
}

impl EnvFileProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigProvider for EnvFileProvider {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Option<Loaded>> {
        if !self.path.is_file() {
            debug!("settings file {} not found", self.path.display());
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        Ok(Some(Loaded {
            source: Source::EnvFile(self.path.clone()),
            values: env_file::parse(&content)
                .with_context(|| format!("invalid settings in {}", self.path.display()))?,
        }))
    }
}

/// Named secret in Google Secret Manager, active when `GOOGLE_CLOUD_PROJECT` is set.
#[derive(Clone, Debug)]
pub struct SecretManagerProvider {
    project: Option<String>,
    secret: String,
    metadata_host: String,
    api_base: String,
}

impl SecretManagerProvider {
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            project: env.get(ENV_CLOUD_PROJECT).map(ToString::to_string),
            secret: env
                .get(ENV_SETTINGS_NAME)
                .unwrap_or(DEFAULT_SETTINGS_NAME)
                .to_string(),
            metadata_host: env
                .get(ENV_METADATA_HOST)
                .unwrap_or(DEFAULT_METADATA_HOST)
                .to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }
}

#[async_trait]
impl ConfigProvider for SecretManagerProvider {
    fn describe(&self) -> String {
        ENV_CLOUD_PROJECT.to_string()
    }

    async fn load(&self) -> Result<Option<Loaded>> {
        let Some(project) = &self.project else {
            return Ok(None);
        };

        let client = SecretManagerClient::new(&self.metadata_host)?.with_api_base(&self.api_base);
        let payload = client.access_latest(project, &self.secret).await?;

        Ok(Some(Loaded {
            source: Source::SecretManager {
                project: project.clone(),
                secret: self.secret.clone(),
            },
            values: env_file::parse(&payload)
                .with_context(|| format!("invalid settings in secret {}", self.secret))?,
        }))
    }
}

#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ProviderChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Local file first, then Secret Manager.
    #[must_use]
    pub fn standard(env_file: &Path, env: &Environment) -> Self {
        Self::new()
            .with(EnvFileProvider::new(env_file))
            .with(SecretManagerProvider::from_environment(env))
    }

    #[must_use]
    pub fn with(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Load from the first applicable provider.
    ///
    /// # Errors
    /// Returns [`Error::NoSource`] when no provider applies, or
    /// [`Error::Provider`] when the applicable provider fails.
    pub async fn resolve(&self) -> Result<Loaded, Error> {
        for provider in &self.providers {
            match provider.load().await {
                Ok(Some(loaded)) => {
                    info!("settings loaded from {}", loaded.source);
                    return Ok(loaded);
                }
                Ok(None) => {}
                Err(err) => {
                    return Err(Error::Provider {
                        provider: provider.describe(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        Err(Error::NoSource {
            tried: self.providers.iter().map(|p| p.describe()).collect(),
        })
    }
}
