//! Notification dispatch for order milestones.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::aggregate::DomainEvent;

/// Errors reported by a notification backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification payload could not be encoded: {0}")]
    Encoding(String),
}

/// Sends a templated message (email, webhook, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, template: &str, data: Value) -> Result<(), NotifyError>;
}

/// Sends an event to the notifier, using its type as the template name.
///
/// Fire-and-forget: a failure is logged and swallowed so it never undoes the
/// state change that produced the event.
pub async fn dispatch<E: DomainEvent>(notifier: &dyn Notifier, event: &E) {
    let template = event.event_type();
    let result = match serde_json::to_value(event) {
        Ok(data) => notifier.notify(template, data).await,
        Err(e) => Err(NotifyError::Encoding(e.to_string())),
    };

    if let Err(error) = result {
        tracing::warn!(template, %error, "Notification dropped");
    }
}

/// A notifier that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _template: &str, _data: Value) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    sent: Vec<(String, Value)>,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<NotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every delivery.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Template names sent so far, in order.
    pub async fn templates(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .map(|(template, _)| template.clone())
            .collect()
    }

    pub async fn sent(&self) -> Vec<(String, Value)> {
        self.state.read().await.sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, template: &str, data: Value) -> Result<(), NotifyError> {
        let mut state = self.state.write().await;
        if state.fail {
            return Err(NotifyError::Delivery("mail server down".to_string()));
        }
        state.sent.push((template.to_string(), data));
        Ok(())
    }
}
