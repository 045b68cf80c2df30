use crate::{
    accounts::{AccountStore, EmailConfirmed, EventBus},
    settings::Settings,
};
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

pub mod handlers;
pub mod openapi;
pub mod security;

/// Everything the handlers need, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub settings: Arc<Settings>,
    pub accounts: Arc<dyn AccountStore>,
    pub events: Arc<EventBus<EmailConfirmed>>,
    pub pool: PgPool,
}

/// Build the application router.
#[must_use]
pub fn router(services: Services) -> Router {
    let policy = Arc::new(services.settings.hosts.clone());

    Router::new()
        .route("/health", get(handlers::health).options(handlers::health))
        .route("/openapi.json", get(openapi::openapi))
        .route(
            "/v1/events/email-confirmed",
            post(handlers::email_confirmed),
        )
        .route(
            "/v1/accounts/:username/verification",
            get(handlers::verification),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(middleware::from_fn_with_state(policy, security::enforce))
                .layer(Extension(services.settings))
                .layer(Extension(services.accounts))
                .layer(Extension(services.events))
                .layer(Extension(services.pool)),
        )
}

/// Serve the API on `port` until ctrl-c.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(port: u16, services: Services) -> Result<()> {
    let app = router(services);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        accounts::{
            store::testing::{account, MemoryAccountStore},
            Account, AdminNotifier,
        },
        email::testing::MemoryEmailSender,
        settings::{env_file, BootstrapOptions, Environment, Loaded, Source},
    };
    use axum::http::{Method, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use std::{path::PathBuf, time::Duration};
    use tower::ServiceExt;

    const SETTINGS: &str = "\
SECRET_KEY=hook-secret
DATABASE_URL=postgres://finance:pw@127.0.0.1:1/finance
EMAIL_BACKEND=console
EMAIL_USE_TLS=false
EMAIL_PORT=25
EMAIL_HOST=localhost
EMAIL_HOST_USER=
EMAIL_HOST_PASSWORD=
SERVER_EMAIL=server@example.com
DEFAULT_FROM_EMAIL=noreply@example.com
APPENGINE_URL=finance.example.com
";

    fn settings() -> Settings {
        Settings::from_loaded(
            Loaded {
                source: Source::EnvFile(PathBuf::from(".env")),
                values: env_file::parse(SETTINGS).unwrap(),
            },
            &BootstrapOptions::default(),
            &Environment::default(),
        )
        .unwrap()
    }

    fn app(accounts: Vec<Account>, transport: &Arc<MemoryEmailSender>) -> Router {
        let settings = Arc::new(settings());
        let store: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new(accounts));

        let mut events = EventBus::new();
        events.connect(Arc::new(AdminNotifier::new(
            store.clone(),
            transport.clone(),
            settings.email.default_from_email.clone(),
        )));

        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(300))
            .connect_lazy_with(settings.database.connect_options());

        router(Services {
            settings,
            accounts: store,
            events: Arc::new(events),
            pool,
        })
    }

    fn accounts() -> Vec<Account> {
        vec![account(1, "root", true), account(2, "carol", false)]
    }

    fn hook(username: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/v1/events/email-confirmed")
            .header("host", "finance.example.com")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("x-webfinance-event-token", token);
        }
        builder
            .body(Body::from(format!(r#"{{"username":"{username}"}}"#)))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_email_confirmed_notifies_admins() {
        let transport = Arc::new(MemoryEmailSender::default());
        let response = app(accounts(), &transport)
            .oneshot(hook("carol", Some("hook-secret")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().contains_key("x-request-id"));

        let outbox = transport.outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].recipients, vec!["root@example.com".to_string()]);
        assert_eq!(outbox[0].from_email, "noreply@example.com");
        assert!(outbox[0].body.contains("User:  carol"));
    }

    #[tokio::test]
    async fn test_email_confirmed_requires_token() {
        let transport = Arc::new(MemoryEmailSender::default());

        let response = app(accounts(), &transport)
            .oneshot(hook("carol", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(accounts(), &transport)
            .oneshot(hook("carol", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(transport.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_email_confirmed_unknown_account() {
        let transport = Arc::new(MemoryEmailSender::default());
        let response = app(accounts(), &transport)
            .oneshot(hook("mallory", Some("hook-secret")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(transport.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_email_confirmed_account_without_email() {
        let transport = Arc::new(MemoryEmailSender::default());
        let mut incomplete = account(3, "dave", false);
        incomplete.email.clear();

        let response = app(vec![account(1, "root", true), incomplete], &transport)
            .oneshot(hook("dave", Some("hook-secret")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(transport.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_email_confirmed_transport_failure() {
        let transport = Arc::new(MemoryEmailSender::failing());
        let response = app(accounts(), &transport)
            .oneshot(hook("carol", Some("hook-secret")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_verification() {
        let transport = Arc::new(MemoryEmailSender::default());
        let request = Request::builder()
            .uri("/v1/accounts/carol/verification")
            .header("host", "finance.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["username"], "carol");
        assert_eq!(body["email"], "carol@example.com");
        assert_eq!(body["email_verified"], true);

        let request = Request::builder()
            .uri("/v1/accounts/nobody/verification")
            .header("host", "finance.example.com")
            .body(Body::empty())
            .unwrap();
        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_disallowed_host() {
        let transport = Arc::new(MemoryEmailSender::default());
        let request = Request::builder()
            .uri("/v1/accounts/carol/verification")
            .header("host", "evil.example.net")
            .body(Body::empty())
            .unwrap();

        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_plain_http_is_redirected() {
        let transport = Arc::new(MemoryEmailSender::default());
        let request = Request::builder()
            .uri("/v1/accounts/carol/verification?x=1")
            .header("host", "finance.example.com")
            .header("x-forwarded-proto", "http")
            .body(Body::empty())
            .unwrap();

        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "https://finance.example.com/v1/accounts/carol/verification?x=1"
        );
    }

    #[tokio::test]
    async fn test_untrusted_origin_is_forbidden() {
        let transport = Arc::new(MemoryEmailSender::default());
        let mut request = hook("carol", Some("hook-secret"));
        request
            .headers_mut()
            .insert("origin", HeaderValue::from_static("https://evil.example.net"));

        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(transport.outbox().is_empty());

        let mut request = hook("carol", Some("hook-secret"));
        request.headers_mut().insert(
            "origin",
            HeaderValue::from_static("https://finance.example.com"),
        );
        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_database() {
        let transport = Arc::new(MemoryEmailSender::default());
        let request = Request::builder()
            .uri("/health")
            .header("host", "finance.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key("X-App"));

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(body["database"], "error");
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let transport = Arc::new(MemoryEmailSender::default());
        let request = Request::builder()
            .uri("/openapi.json")
            .header("host", "finance.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app(accounts(), &transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["paths"]["/v1/events/email-confirmed"].is_object());
    }
}
