//! Typed event bus.
//!
//! Receivers are connected once while the process is wired together and are
//! invoked in connection order each time an event is published. Publishing
//! awaits every receiver before returning; the first failure stops the chain
//! and is returned to the publisher.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::Account;

/// Request that caused an event, as far as the publisher knows it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub host: Option<String>,
    pub request_id: Option<String>,
    pub client_ip: Option<String>,
}

/// An account's email address was confirmed by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailConfirmed {
    pub account: Account,
    pub request: RequestContext,
}

#[async_trait]
pub trait Receiver<E>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn receive(&self, event: &E) -> Result<bool>;
}

pub struct EventBus<E> {
    receivers: Vec<Arc<dyn Receiver<E>>>,
}

impl<E> EventBus<E>
where
    E: Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            receivers: Vec::new(),
        }
    }

    pub fn connect(&mut self, receiver: Arc<dyn Receiver<E>>) {
        debug!(receiver = receiver.name(), "receiver connected");
        self.receivers.push(receiver);
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.receivers.len()
    }

    /// Deliver `event` to every receiver and collect their responses.
    ///
    /// # Errors
    /// Returns the first receiver error; later receivers are not called.
    pub async fn publish(&self, event: &E) -> Result<Vec<(&'static str, bool)>> {
        let mut responses = Vec::with_capacity(self.receivers.len());
        for receiver in &self.receivers {
            let response = receiver
                .receive(event)
                .await
                .with_context(|| format!("receiver {} failed", receiver.name()))?;
            responses.push((receiver.name(), response));
        }
        Ok(responses)
    }
}

impl<E> Default for EventBus<E>
where
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
