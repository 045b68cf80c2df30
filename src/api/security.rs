//! Host, scheme and origin checks driven by the [`HostPolicy`].

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::settings::HostPolicy;

/// Reject requests for unknown hosts, redirect plain HTTP and refuse
/// cross-origin unsafe requests.
pub async fn enforce(
    State(policy): State<Arc<HostPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let host = header_str(headers, header::HOST.as_str())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
        .to_string();

    if !policy.allows_host(&host) {
        debug!(host = %host, "disallowed host");
        return (StatusCode::BAD_REQUEST, "Invalid host").into_response();
    }

    if policy.secure_ssl_redirect()
        && header_str(headers, "x-forwarded-proto").is_some_and(|proto| proto == "http")
    {
        let path = request
            .uri()
            .path_and_query()
            .map_or("/", |path| path.as_str());
        let location = format!("https://{host}{path}");
        return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response();
    }

    if !is_safe(request.method()) {
        if let Some(origin) = header_str(headers, header::ORIGIN.as_str()) {
            if !origin_allowed(&policy, origin, &host) {
                debug!(origin, "untrusted origin");
                return (StatusCode::FORBIDDEN, "Origin not trusted").into_response();
            }
        }
    }

    next.run(request).await
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Trusted origins, plus the request's own host over any scheme.
fn origin_allowed(policy: &HostPolicy, origin: &str, host: &str) -> bool {
    if policy.trusts_origin(origin) {
        return true;
    }
    let Ok(origin) = Url::parse(origin) else {
        return false;
    };
    let authority = match (origin.host_str(), origin.port()) {
        (Some(name), Some(port)) => format!("{name}:{port}"),
        (Some(name), None) => name.to_string(),
        (None, _) => return false,
    };
    authority.eq_ignore_ascii_case(host)
}
