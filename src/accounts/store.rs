use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument};

use super::Account;

/// Read access to accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Email addresses of every administrator account, in id order.
    async fn superuser_emails(&self) -> Result<Vec<String>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;
}

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn superuser_emails(&self) -> Result<Vec<String>> {
        let query = r"
            SELECT email
            FROM accounts
            WHERE is_superuser AND email <> ''
            ORDER BY id ASC
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to load administrator accounts")?;

        Ok(rows.iter().map(|row| row.get("email")).collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let query = r"
            SELECT id, username, email, email_verified, is_superuser
            FROM accounts
            WHERE username = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account")?;

        Ok(row.as_ref().map(account_from_row))
    }
}

fn account_from_row(row: &PgRow) -> Account {
    Account {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        email_verified: row.get("email_verified"),
        is_superuser: row.get("is_superuser"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Account, AccountStore};
    use anyhow::Result;
    use async_trait::async_trait;

    /// Fixed set of accounts held in memory.
    #[derive(Default)]
    pub(crate) struct MemoryAccountStore {
        accounts: Vec<Account>,
    }

    impl MemoryAccountStore {
        pub(crate) fn new(accounts: Vec<Account>) -> Self {
            Self { accounts }
        }
    }

    #[async_trait]
    impl AccountStore for MemoryAccountStore {
        async fn superuser_emails(&self) -> Result<Vec<String>> {
            Ok(self
                .accounts
                .iter()
                .filter(|account| account.is_superuser)
                .map(|account| account.email.clone())
                .collect())
        }

        async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
            Ok(self
                .accounts
                .iter()
                .find(|account| account.username == username)
                .cloned())
        }
    }

    pub(crate) fn account(id: i64, username: &str, is_superuser: bool) -> Account {
        Account {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            email_verified: true,
            is_superuser,
        }
    }
}
