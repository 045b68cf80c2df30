//! Host and origin allow-lists derived from the deployment URLs.

use url::Url;

const DEFAULT_SCHEME: &str = "https";

/// Hosts the service answers for and origins trusted for unsafe requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostPolicy {
    allowed_hosts: Vec<String>,
    trusted_origins: Vec<String>,
    secure_ssl_redirect: bool,
}

impl HostPolicy {
    /// Open policy used when no deployment URL is configured: any host, no redirect.
    ///
    /// Only suitable for local or private deployments.
    #[must_use]
    pub fn any() -> Self {
        Self {
            allowed_hosts: vec!["*".to_string()],
            trusted_origins: Vec::new(),
            secure_ssl_redirect: false,
        }
    }

    /// Build the policy from the `APPENGINE_URL` list.
    ///
    /// URLs without a scheme get `https://`. A malformed URL is taken as-is.
    #[must_use]
    pub fn from_deployment_urls<S: AsRef<str>>(urls: &[S]) -> Self {
        let urls: Vec<&str> = urls
            .iter()
            .map(|url| url.as_ref().trim())
            .filter(|url| !url.is_empty())
            .collect();

        if urls.is_empty() {
            return Self::any();
        }

        let mut allowed_hosts = Vec::with_capacity(urls.len());
        let mut trusted_origins = Vec::with_capacity(urls.len());

        for url in urls {
            let url = with_default_scheme(url);
            allowed_hosts.push(netloc(&url));
            trusted_origins.push(url);
        }

        Self {
            allowed_hosts,
            trusted_origins,
            secure_ssl_redirect: true,
        }
    }

    #[must_use]
    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    #[must_use]
    pub fn trusted_origins(&self) -> &[String] {
        &self.trusted_origins
    }

    #[must_use]
    pub fn secure_ssl_redirect(&self) -> bool {
        self.secure_ssl_redirect
    }

    /// Whether a request `Host` header value is allowed.
    ///
    /// Ports are ignored on both sides. `*` matches anything and a leading
    /// dot matches the domain and all of its subdomains.
    #[must_use]
    pub fn allows_host(&self, host: &str) -> bool {
        let host = host_name(host);
        let host = host.trim_end_matches('.');
        if host.is_empty() {
            return false;
        }

        self.allowed_hosts.iter().any(|pattern| {
            if pattern == "*" {
                return true;
            }
            match pattern.strip_prefix('.') {
                Some(domain) => {
                    let domain = host_name(domain);
                    host == domain || host.ends_with(&format!(".{domain}"))
                }
                None => host == host_name(pattern),
            }
        })
    }

    /// Whether an `Origin` header value is one of the trusted origins.
    #[must_use]
    pub fn trusts_origin(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.trusted_origins
            .iter()
            .any(|trusted| trusted.trim_end_matches('/').eq_ignore_ascii_case(origin))
    }
}

impl Default for HostPolicy {
    fn default() -> Self {
        Self::any()
    }
}

fn with_default_scheme(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{url}")
    }
}

/// Network location (`host[:port]`) of a scheme-qualified URL. Input that
/// does not parse is kept verbatim, minus the scheme.
fn netloc(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(host) = parsed.host_str().filter(|host| !host.is_empty()) {
            return match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
        }
    }
    url.split_once("://")
        .map_or(url, |(_, rest)| rest)
        .to_string()
}

/// Lowercase host of a `Host` header value or allow-list entry, without the port.
fn host_name(authority: &str) -> String {
    Url::parse(&format!("http://{authority}"))
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| authority.to_string())
        .to_ascii_lowercase()
}
