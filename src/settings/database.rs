//! Database connection parameters parsed from `DATABASE_URL`.

use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;
use url::Url;

use super::Error;

/// Loopback address of the Cloud SQL auth proxy sidecar.
pub const PROXY_HOST: &str = "127.0.0.1";
pub const PROXY_PORT: u16 = 5432;

/// Query parameters that pick the server and are replaced by the proxy.
const TARGET_PARAMS: [&str; 3] = ["host", "hostaddr", "port"];

#[derive(Clone)]
pub struct DatabaseSettings {
    url: Url,
    options: PgConnectOptions,
}

fn invalid(reason: impl ToString) -> Error {
    Error::InvalidValue {
        key: "DATABASE_URL",
        reason: reason.to_string(),
    }
}

impl DatabaseSettings {
    /// Parse a `postgres://` or `postgresql://` connection URL. Every
    /// parameter `sqlx` understands is kept, including `host=/cloudsql/...`
    /// unix sockets.
    ///
    /// # Errors
    /// Returns [`Error::InvalidValue`] if the URL does not parse or uses another scheme.
    pub fn parse(database_url: &str) -> Result<Self, Error> {
        let url = Url::parse(database_url).map_err(invalid)?;

        match url.scheme() {
            "postgres" | "postgresql" => {}
            other => return Err(invalid(format!("unsupported scheme {other}"))),
        }

        Self::from_url(url)
    }

    fn from_url(url: Url) -> Result<Self, Error> {
        let options = PgConnectOptions::from_str(url.as_str()).map_err(invalid)?;
        Ok(Self { url, options })
    }

    /// Route connections through the local auth proxy. Other parameters
    /// (credentials, database, `sslmode`, `options`, ...) are kept.
    ///
    /// # Errors
    /// Returns [`Error::InvalidValue`] if the URL cannot take a host.
    pub fn via_local_proxy(self) -> Result<Self, Error> {
        let mut url = self.url;

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !TARGET_PARAMS.contains(&key.as_ref()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        url.set_host(Some(PROXY_HOST)).map_err(invalid)?;
        url.set_port(Some(PROXY_PORT))
            .map_err(|()| invalid("cannot set the proxy port"))?;

        Self::from_url(url)
    }

    /// Connection options for `sqlx`.
    #[must_use]
    pub fn connect_options(&self) -> PgConnectOptions {
        self.options.clone()
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.options.get_host()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.options.get_port()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.options.get_database()
    }

    #[must_use]
    pub fn user(&self) -> &str {
        self.options.get_username()
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut redacted = self.url.clone();
        if redacted.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        f.debug_tuple("DatabaseSettings")
            .field(&redacted.as_str())
            .finish()
    }
}

/// Connection target without credentials, for logs.
impl std::fmt::Display for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let target = match self.options.get_socket() {
            Some(socket) => socket.display().to_string(),
            None => format!("{}:{}", self.host(), self.port()),
        };
        write!(
            f,
            "postgres://{}@{}/{}",
            self.user(),
            target,
            self.name().unwrap_or_default()
        )
    }
}
