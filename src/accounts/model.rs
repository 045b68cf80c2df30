use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A registered user as seen by this service.
///
/// Rows are created and verified by the identity provider; this service only reads them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub is_superuser: bool,
}

impl Account {
    /// Username and email are both present.
    #[must_use]
    pub fn is_identifiable(&self) -> bool {
        !self.username.trim().is_empty() && !self.email.trim().is_empty()
    }
}
