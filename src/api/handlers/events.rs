//! Hook called by the identity provider once a user verifies their email.

use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use crate::{
    accounts::{AccountStore, EmailConfirmed, EventBus, RequestContext},
    settings::Settings,
};

/// Shared secret presented by the identity provider.
pub const EVENT_TOKEN_HEADER: &str = "x-webfinance-event-token";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailConfirmedHook {
    username: String,
}

#[utoipa::path(
    post,
    path = "/v1/events/email-confirmed",
    request_body = EmailConfirmedHook,
    params(
        ("X-Webfinance-Event-Token" = String, Header, description = "Shared event token"),
    ),
    responses (
        (status = 204, description = "Event delivered to every receiver"),
        (status = 400, description = "Missing payload"),
        (status = 401, description = "Missing or invalid event token"),
        (status = 404, description = "Account not found"),
        (status = 422, description = "Account has no username or email"),
        (status = 500, description = "A receiver failed"),
    ),
    tag = "events",
)]
#[instrument(skip_all)]
pub async fn email_confirmed(
    headers: HeaderMap,
    settings: Extension<Arc<Settings>>,
    accounts: Extension<Arc<dyn AccountStore>>,
    events: Extension<Arc<EventBus<EmailConfirmed>>>,
    payload: Option<Json<EmailConfirmedHook>>,
) -> impl IntoResponse {
    let token = headers.get(EVENT_TOKEN_HEADER).map(HeaderValue::as_bytes);
    if !token_matches(token, settings.secret_key.expose_secret()) {
        debug!("rejected event with missing or invalid token");
        return (StatusCode::UNAUTHORIZED, "Invalid event token".to_string());
    }

    let hook = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()),
    };

    let account = match accounts.find_by_username(&hook.username).await {
        Ok(Some(account)) => account,
        Ok(None) => return (StatusCode::NOT_FOUND, "Account not found".to_string()),
        Err(err) => {
            error!("Failed to load account: {:#}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load account".to_string(),
            );
        }
    };

    if !account.is_identifiable() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Account has no username or email".to_string(),
        );
    }

    let event = EmailConfirmed {
        account,
        request: request_context(&headers),
    };

    match events.publish(&event).await {
        Ok(responses) => {
            info!(
                username = %event.account.username,
                receivers = responses.len(),
                "email confirmation delivered"
            );
            (StatusCode::NO_CONTENT, String::new())
        }
        Err(err) => {
            error!("Failed to deliver email confirmation: {:#}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to deliver event".to_string(),
            )
        }
    }
}

/// Compare the presented token with the secret in constant time.
fn token_matches(token: Option<&[u8]>, secret: &str) -> bool {
    token.is_some_and(|token| bool::from(token.ct_eq(secret.as_bytes())))
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    };

    RequestContext {
        host: header("host"),
        request_id: header("x-request-id"),
        client_ip: header("x-forwarded-for")
            .and_then(|list| list.split(',').next().map(|ip| ip.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches() {
        assert!(token_matches(Some(b"hook-secret"), "hook-secret"));
        assert!(!token_matches(Some(b"hook-secreT"), "hook-secret"));
        assert!(!token_matches(Some(b"hook"), "hook-secret"));
        assert!(!token_matches(Some(b""), "hook-secret"));
        assert!(!token_matches(None, "hook-secret"));
    }

    #[test]
    fn test_request_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("finance.example.com"));
        headers.insert("x-request-id", HeaderValue::from_static("01J0000000"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );

        let context = request_context(&headers);
        assert_eq!(context.host.as_deref(), Some("finance.example.com"));
        assert_eq!(context.request_id.as_deref(), Some("01J0000000"));
        assert_eq!(context.client_ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_request_context_defaults() {
        assert_eq!(request_context(&HeaderMap::new()), RequestContext::default());
    }
}
