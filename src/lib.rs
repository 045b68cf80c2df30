//! # WebFinance accounts service
//!
//! Account-side companion of the WebFinance web application.
//!
//! ## Sign-up notifications
//!
//! The identity provider calls `POST /v1/events/email-confirmed` when a user
//! verifies their email address. The hook publishes an `EmailConfirmed` event
//! on the process event bus, and the admin notifier sends a single summary
//! email to every administrator account (`is_superuser`). The email is sent
//! before the hook answers; a failed delivery fails the request.
//!
//! ## Settings bootstrap
//!
//! Settings are resolved once at startup from exactly one source:
//!
//! - **Local file:** `.env` (or `--env-file`) when it exists.
//! - **Secret Manager:** otherwise, the secret named by `SETTINGS_NAME` in the
//!   project named by `GOOGLE_CLOUD_PROJECT`.
//!
//! Allowed hosts and trusted origins come from `APPENGINE_URL`, the database
//! from `DATABASE_URL` (rewritten to the local Cloud SQL Auth Proxy when
//! `USE_CLOUD_SQL_AUTH_PROXY` is set), and logs go either to Cloud Logging or
//! to a rotating local file.

pub mod accounts;
pub mod api;
pub mod cli;
pub mod email;
pub mod settings;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
