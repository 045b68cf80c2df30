//! Tell administrators when a user verifies their email address.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    events::{EmailConfirmed, Receiver},
    store::AccountStore,
    Account,
};
use crate::email::{EmailMessage, MailTransport};

pub const SUBJECT: &str = "New Sign-Up to WebFinance";

/// Body of the sign-up notification for `account`.
#[must_use]
pub fn compose_body(account: &Account) -> String {
    format!(
        "This is an automated message from WebFinance.\n\n\
         A user has just verified their email address:\n\
         User:  {}\n\
         Email: {}\n\n",
        account.username, account.email
    )
}

/// Sends one summary email to all administrators per confirmed address.
pub struct AdminNotifier {
    store: Arc<dyn AccountStore>,
    transport: Arc<dyn MailTransport>,
    from_email: String,
}

impl AdminNotifier {
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        transport: Arc<dyn MailTransport>,
        from_email: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            from_email: from_email.into(),
        }
    }

    /// Notify administrators about `account`.
    ///
    /// Administrators with a blank email are skipped. An empty recipient list
    /// is not an error: the transport is still called, with no recipients.
    ///
    /// # Errors
    /// Returns an error if the account lacks a username or email, the
    /// administrators cannot be loaded, or the transport fails.
    #[instrument(skip(self, account), fields(username = %account.username))]
    pub async fn notify(&self, account: &Account) -> Result<bool> {
        if !account.is_identifiable() {
            bail!("account {} has no username or email", account.id);
        }

        let recipients: Vec<String> = self
            .store
            .superuser_emails()
            .await?
            .into_iter()
            .filter(|email| !email.trim().is_empty())
            .collect();

        let message = EmailMessage {
            subject: SUBJECT.to_string(),
            body: compose_body(account),
            from_email: self.from_email.clone(),
            recipients,
        };

        let sent = self.transport.send(&message).await?;
        info!(
            recipients = message.recipients.len(),
            sent, "sign-up notification dispatched"
        );

        Ok(true)
    }
}

#[async_trait]
impl Receiver<EmailConfirmed> for AdminNotifier {
    fn name(&self) -> &'static str {
        "admin_notifier"
    }

    async fn receive(&self, event: &EmailConfirmed) -> Result<bool> {
        self.notify(&event.account).await
    }
}
