//! Hooks fired after a lifecycle transition reaches a final disposition.
//!
//! Notifications are sent after the transition has committed. Delivery failures
//! are logged and never undo the transition.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleNotification {
    WinVerified {
        entry_id: Uuid,
        reviewer_id: Option<Uuid>,
        at: DateTime<Utc>,
    },
    WinRejected {
        entry_id: Uuid,
        reviewer_id: Option<Uuid>,
        at: DateTime<Utc>,
    },
    /// Either an entry expired without a report, or an overdue win claim was
    /// closed by the sweep.
    AutoMissApplied { entry_id: Uuid, at: DateTime<Utc> },
}

impl LifecycleNotification {
    pub fn entry_id(&self) -> Uuid {
        match self {
            Self::WinVerified { entry_id, .. }
            | Self::WinRejected { entry_id, .. }
            | Self::AutoMissApplied { entry_id, .. } => *entry_id,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, notification: LifecycleNotification);
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: LifecycleNotification) {
        tracing::info!(
            entry_id = %notification.entry_id(),
            ?notification,
            "Lifecycle notification"
        );
    }
}

/// Posts each notification as JSON to a downstream mailer.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Host (and port) of the endpoint, without credentials, path or query.
    pub fn host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let authority = without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(without_scheme);
        authority.rsplit('@').next().unwrap_or(authority)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: LifecycleNotification) {
        let entry_id = notification.entry_id();
        let result = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => tracing::debug!(%entry_id, "Notification delivered"),
            Err(e) => tracing::warn!(%entry_id, error = %e, "Failed to deliver notification"),
        }
    }
}

/// Keeps every notification in memory, for local runs and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<LifecycleNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<LifecycleNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: LifecycleNotification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
