//! Google Secret Manager access with ambient (metadata server) credentials.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info_span, instrument, Instrument};

pub const DEFAULT_API_BASE: &str = "https://secretmanager.googleapis.com";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessSecretVersion {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

/// Client for `projects/*/secrets/*/versions/*:access`.
#[derive(Clone, Debug)]
pub struct SecretManagerClient {
    client: Client,
    api_base: String,
    metadata_base: String,
}

impl SecretManagerClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(metadata_host: &str) -> Result<Self> {
        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            metadata_base: metadata_base(metadata_host),
        })
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the latest version of `secret` in `project` as UTF-8 text.
    ///
    /// # Errors
    /// Returns an error if no access token can be obtained, the secret request
    /// fails, or the payload is not base64-encoded UTF-8.
    #[instrument(skip(self))]
    pub async fn access_latest(&self, project: &str, secret: &str) -> Result<String> {
        let token = self.access_token().await?;

        let url = format!(
            "{}/v1/projects/{project}/secrets/{secret}/versions/latest:access",
            self.api_base
        );

        let span = info_span!("secretmanager.access", http.method = "GET", url = %url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .instrument(span)
            .await
            .with_context(|| format!("failed to reach secret manager for {secret}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("secret manager access failed: {status} {body}"));
        }

        let version: AccessSecretVersion = response
            .json()
            .await
            .context("unexpected secret manager response")?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(version.payload.data)
            .context("secret payload is not valid base64")?;

        String::from_utf8(decoded).context("secret payload is not valid UTF-8")
    }

    async fn access_token(&self) -> Result<String> {
        let url = format!("{}{TOKEN_PATH}", self.metadata_base);
        debug!("requesting access token from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("metadata server unreachable; no ambient credentials")?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("metadata token request failed: {status}"));
        }

        let token: AccessToken = response
            .json()
            .await
            .context("unexpected metadata token response")?;

        Ok(token.access_token)
    }
}

fn metadata_base(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_base() {
        assert_eq!(
            metadata_base(DEFAULT_METADATA_HOST),
            "http://metadata.google.internal"
        );
        assert_eq!(metadata_base("127.0.0.1:9999/"), "http://127.0.0.1:9999");
        assert_eq!(metadata_base("https://meta.local"), "https://meta.local");
    }

    #[test]
    fn test_with_api_base_trims_slash() -> Result<()> {
        let client = SecretManagerClient::new(DEFAULT_METADATA_HOST)?.with_api_base("http://x/");
        assert_eq!(client.api_base, "http://x");
        Ok(())
    }
}
