use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::accounts::AccountStore;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Verification {
    pub username: String,
    pub email: String,
    pub email_verified: bool,
}

#[utoipa::path(
    get,
    path = "/v1/accounts/{username}/verification",
    params(
        ("username" = String, Path, description = "Account username"),
    ),
    responses (
        (status = 200, description = "Verification state of the account", body = Verification),
        (status = 404, description = "Account not found"),
    ),
    tag = "accounts",
)]
/// Whether an account has verified its email address.
pub async fn verification(
    Path(username): Path<String>,
    accounts: Extension<Arc<dyn AccountStore>>,
) -> Response {
    match accounts.find_by_username(&username).await {
        Ok(Some(account)) => Json(Verification {
            username: account.username,
            email: account.email,
            email_verified: account.email_verified,
        })
        .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Account not found").into_response(),
        Err(err) => {
            error!("Failed to load account: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
