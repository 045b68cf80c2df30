use axum::response::Json;
use utoipa::OpenApi;

use crate::api::handlers::{accounts, events, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        events::email_confirmed,
        accounts::verification,
    ),
    components(schemas(
        health::Health,
        events::EmailConfirmedHook,
        accounts::Verification,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "events", description = "Identity provider hooks"),
        (name = "accounts", description = "Account verification state"),
    )
)]
pub struct ApiDoc;

/// Serve the generated `OpenAPI` document.
pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
